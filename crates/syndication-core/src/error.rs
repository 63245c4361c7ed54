use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyndicationError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for SyndicationError {
    fn from(e: serde_json::Error) -> Self {
        SyndicationError::SerializationError(e.to_string())
    }
}
