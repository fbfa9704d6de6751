use thiserror::Error;

#[derive(Error, Debug)]
pub enum NeoError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed Neo response: {0}")]
    Parse(String),

    #[error("Neo is improperly configured: {0}")]
    ImproperlyConfigured(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Neo Web Services not responding")]
    ServiceUnavailable,

    #[error("Neo rejected the request: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Not supported by Neo: {0}")]
    Unsupported(&'static str),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, NeoError>;
