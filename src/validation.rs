//! Field rules Neo enforces on login aliases and mobile numbers.

use crate::error::{NeoError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static MOBILE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]*$").unwrap());
// Neo rejects aliases without a run of four characters that are not spaces, '+' or capitals.
static LOGIN_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^ +A-Z]{4,}").unwrap());

pub fn validate_mobile_number(value: &str) -> Result<()> {
    check("mobile_number", &MOBILE_NUMBER, value)
}

pub fn validate_login_alias(value: &str) -> Result<()> {
    check("username", &LOGIN_ALIAS, value)
}

/// Validates `value` by field name; fields without a rule always pass.
pub fn validate(field: &str, value: &str) -> Result<()> {
    match field {
        "mobile_number" => validate_mobile_number(value),
        "username" | "login_alias" => validate_login_alias(value),
        _ => Ok(()),
    }
}

fn check(field: &str, re: &Regex, value: &str) -> Result<()> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(NeoError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_number() {
        assert!(validate_mobile_number("+27821234567").is_ok());
        assert!(validate_mobile_number("0821234567").is_ok());
        assert!(validate_mobile_number("082 123").is_err());
        assert!(validate_mobile_number("27+82").is_err());
    }

    #[test]
    fn test_login_alias() {
        assert!(validate_login_alias("user_1234").is_ok());
        assert!(validate_login_alias("ABC def1").is_ok());
        assert!(validate_login_alias("ABCDEF").is_err());
        assert!(validate_login_alias("ab c").is_err());
    }

    #[test]
    fn test_dispatch_by_field_name() {
        assert!(validate("mobile_number", "abc").is_err());
        assert!(validate("first_name", "ANYTHING GOES").is_ok());
    }
}
