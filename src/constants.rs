//! Codes defined by the Neo consumer service.
//!
//! These are fixed by the remote API; the names follow the vendor's terms.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marks the nature of a field change in a consumer update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifyFlag {
    Insert,
    Update,
    Delete,
    /// Preference answers use this in place of `Update`.
    Modify,
}

impl ModifyFlag {
    pub fn code(self) -> &'static str {
        match self {
            ModifyFlag::Insert => "I",
            ModifyFlag::Update => "U",
            ModifyFlag::Delete => "D",
            ModifyFlag::Modify => "M",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "I" => Some(ModifyFlag::Insert),
            "U" => Some(ModifyFlag::Update),
            "D" => Some(ModifyFlag::Delete),
            "M" => Some(ModifyFlag::Modify),
            _ => None,
        }
    }
}

impl fmt::Display for ModifyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// Phone types
pub const PHONE_TYPE_MOBILE: u32 = 3;

// Email categories
pub const EMAIL_CATEGORY_PERSONAL: u32 = 1;
pub const EMAIL_CATEGORY_MOBILE_NO: u32 = 3;

// Communication channels
pub const COMM_CHANNEL_EMAIL: u32 = 1;
pub const COMM_CHANNEL_SMS: u32 = 4;

// Question categories
pub const QUESTION_CATEGORY_OPTIN: u32 = 1;
pub const QUESTION_CATEGORY_GENERAL: u32 = 4;

/// "Receive communication from brand via communication channel?"
pub const OPT_IN_QUESTION: u32 = 64;
/// "Country of residence?"
pub const COUNTRY_QUESTION: u32 = 92;

// Opt-in answer options
pub const OPTION_YES: u32 = 1;
pub const OPTION_NO: u32 = 2;

// Genders
pub const GENDER_MALE: u32 = 1;
pub const GENDER_FEMALE: u32 = 2;

// Address types
pub const ADDRESS_TYPE_HOME: u32 = 1;

/// Built-in country code to Neo option id table, extended by config.
pub const COUNTRY_OPTION_IDS: &[(&str, u32)] = &[("US", 222)];

pub const DOB_FORMAT: &str = "%Y-%m-%d";
/// Date format for query parameters.
pub const DOB_QUERY_FORMAT: &str = "%Y%m%d";
