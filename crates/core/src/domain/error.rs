// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Failed to decode field '{field}': {source}")]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, DomainError>;
