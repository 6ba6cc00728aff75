use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("Response cache storage error: {0}")]
    Storage(String),

    #[error("Failed to encode cached response: {0}")]
    Serialization(String),

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid intercept configuration: {0}")]
    Config(String),
}

impl From<BridgeError> for InterceptError {
    fn from(err: BridgeError) -> Self {
        InterceptError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for InterceptError {
    fn from(err: serde_json::Error) -> Self {
        InterceptError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InterceptError>;
