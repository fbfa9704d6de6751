use crate::error::NeoError;
use crate::metrics::ApiMetrics;
use crate::xml::{self, ServiceResponse};
use reqwest::Method;
use tracing::error;

/// Maps a failed Neo response to the error callers see, and logs it.
pub fn error_from_response(operation: &'static str, method: &Method, status: u16, body: &str) -> NeoError {
    let err = classify(method, status, body);
    error!(operation, status, error = %err, "Neo API call failed");
    ApiMetrics::record_error(operation, error_kind(&err));
    err
}

fn classify(method: &Method, status: u16, body: &str) -> NeoError {
    if status == 500 {
        return NeoError::ServiceUnavailable;
    }
    let unexpected = || NeoError::Api {
        status,
        body: body.to_string(),
    };
    let Some(responses) = xml::parse(body)
        .ok()
        .and_then(|node| ServiceResponse::list_from_node(&node))
    else {
        return unexpected();
    };

    let is_write = *method == Method::POST || *method == Method::PUT;
    let mut messages = Vec::new();
    // The first configuration or read error in the list decides the result.
    for response in responses {
        match response.code.as_str() {
            "INVALID_APPID" => {
                return NeoError::ImproperlyConfigured("Neo App ID is invalid.".to_string())
            }
            "INVALID_VERSION" => {
                return NeoError::ImproperlyConfigured("Neo API version is invalid.".to_string())
            }
            "BAD_REQUEST" => messages.push(response.message),
            _ if is_write => messages.push(response.message),
            _ => return unexpected(),
        }
    }
    if messages.is_empty() {
        unexpected()
    } else {
        NeoError::Validation(messages)
    }
}

fn error_kind(err: &NeoError) -> &'static str {
    match err {
        NeoError::ServiceUnavailable => "unavailable",
        NeoError::ImproperlyConfigured(_) => "configuration",
        NeoError::Validation(_) => "validation",
        _ => "unexpected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: &str, message: &str) -> String {
        format!(
            "<Response><ResponseCode>{}</ResponseCode><ResponseMessage>{}</ResponseMessage></Response>",
            code, message
        )
    }

    #[test]
    fn test_server_error_means_unavailable() {
        assert!(matches!(
            classify(&Method::GET, 500, "boom"),
            NeoError::ServiceUnavailable
        ));
    }

    #[test]
    fn test_invalid_app_id_is_a_configuration_error() {
        match classify(&Method::GET, 401, &response("INVALID_APPID", "nope")) {
            NeoError::ImproperlyConfigured(msg) => assert_eq!(msg, "Neo App ID is invalid."),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify(&Method::GET, 400, &response("INVALID_VERSION", "nope")),
            NeoError::ImproperlyConfigured(_)
        ));
    }

    #[test]
    fn test_write_errors_become_validation_messages() {
        let body = format!(
            "<ResponseList>{}{}</ResponseList>",
            response("DUPLICATE_LOGIN", "Login name taken"),
            response("BAD_REQUEST", "DOB required")
        );
        match classify(&Method::POST, 409, &body) {
            NeoError::Validation(messages) => {
                assert_eq!(messages, vec!["Login name taken", "DOB required"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_read_errors_other_than_bad_request_are_unexpected() {
        assert!(matches!(
            classify(&Method::GET, 404, &response("NOT_FOUND", "No consumer")),
            NeoError::Api { status: 404, .. }
        ));
        assert!(matches!(
            classify(&Method::GET, 400, &response("BAD_REQUEST", "bad dob")),
            NeoError::Validation(_)
        ));
    }

    #[test]
    fn test_unparseable_body_is_unexpected() {
        assert!(matches!(
            classify(&Method::PUT, 400, "<html>oops"),
            NeoError::Api { status: 400, .. }
        ));
        assert!(matches!(
            classify(&Method::GET, 200, "<Consumer/>"),
            NeoError::Api { status: 200, .. }
        ));
    }

    #[test]
    fn test_first_decisive_code_wins() {
        let body = format!(
            "<ResponseList>{}{}</ResponseList>",
            response("INVALID_VERSION", "old version"),
            response("INVALID_APPID", "bad app")
        );
        match classify(&Method::PUT, 401, &body) {
            NeoError::ImproperlyConfigured(msg) => assert_eq!(msg, "Neo API version is invalid."),
            other => panic!("unexpected {other:?}"),
        }

        let body = format!(
            "<ResponseList>{}{}</ResponseList>",
            response("NOT_FOUND", "No consumer"),
            response("INVALID_APPID", "bad app")
        );
        assert!(matches!(
            classify(&Method::GET, 404, &body),
            NeoError::Api { status: 404, .. }
        ));
    }
}
