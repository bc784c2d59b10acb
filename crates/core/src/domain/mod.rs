// Domain Layer - Messages, identifiers and options

pub mod error;
pub mod message;
pub mod options;

// Re-exports
pub use error::DomainError;
pub use message::{MessageId, StreamMessage, PLACEHOLDER_FIELD, PLACEHOLDER_VALUE};
pub use options::{ConsumerOptions, StreamOptions};
