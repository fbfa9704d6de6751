use super::XmlNode;
use crate::error::{NeoError, Result};
use serde::Serialize;

/// A status record returned by Neo, usually describing an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub code: String,
    pub message: String,
}

impl ServiceResponse {
    /// Reads a `Response` or `ResponseList` document. Any other root yields `None`.
    pub fn list_from_node(node: &XmlNode) -> Option<Vec<ServiceResponse>> {
        match node.name.as_str() {
            "Response" => Some(vec![Self::from_node(node)]),
            "ResponseList" => Some(node.children_named("Response").map(Self::from_node).collect()),
            _ => None,
        }
    }

    fn from_node(node: &XmlNode) -> Self {
        Self {
            code: node.child_text("ResponseCode").unwrap_or_default().trim().to_string(),
            message: node.child_text("ResponseMessage").unwrap_or_default().to_string(),
        }
    }
}

/// One entry of the consumer search by email id and date of birth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerSummary {
    pub consumer_id: String,
    pub login_name: Option<String>,
    pub application_name: Option<String>,
}

impl ConsumerSummary {
    pub fn list_from_node(node: &XmlNode) -> Result<Vec<ConsumerSummary>> {
        node.children_named("Consumer")
            .map(|c| {
                Ok(ConsumerSummary {
                    consumer_id: c
                        .child_text("ConsumerID")
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| NeoError::MissingField("Consumer/ConsumerID".into()))?,
                    login_name: c.child_text("LoginName").map(str::to_string),
                    application_name: c.child_text("ApplicationName").map(str::to_string),
                })
            })
            .collect()
    }
}

/// Extracts the temporary token from a forgot-password response.
pub fn temp_token_from_node(node: &XmlNode) -> Result<String> {
    let token = if node.name == "TempToken" {
        node.text.as_deref()
    } else {
        node.child_text("TempToken")
    };
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| NeoError::MissingField("TempToken".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn test_response_list() {
        let node = parse(
            "<ResponseList>\
               <Response><ResponseCode>BAD_REQUEST</ResponseCode><ResponseMessage>Email taken</ResponseMessage></Response>\
               <Response><ResponseCode>BAD_REQUEST</ResponseCode><ResponseMessage>Bad DOB</ResponseMessage></Response>\
             </ResponseList>",
        )
        .unwrap();
        let list = ServiceResponse::list_from_node(&node).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].message, "Bad DOB");
        assert!(ServiceResponse::list_from_node(&parse("<Consumer/>").unwrap()).is_none());
    }

    #[test]
    fn test_consumer_summaries() {
        let node = parse(
            "<Consumers><Consumer><ConsumerID>12</ConsumerID><LoginName>jo</LoginName>\
             <ApplicationName>App</ApplicationName></Consumer></Consumers>",
        )
        .unwrap();
        let list = ConsumerSummary::list_from_node(&node).unwrap();
        assert_eq!(list[0].consumer_id, "12");
        assert_eq!(list[0].application_name.as_deref(), Some("App"));
    }

    #[test]
    fn test_temp_token() {
        let node = parse("<ForgotPasswordToken><TempToken>abc123</TempToken></ForgotPasswordToken>").unwrap();
        assert_eq!(temp_token_from_node(&node).unwrap(), "abc123");
        assert!(temp_token_from_node(&parse("<Empty/>").unwrap()).is_err());
    }
}
