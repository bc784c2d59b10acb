// Central Error Type for the Queue

use crate::port::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Queue-level error type
#[derive(Error, Debug)]
pub enum QueueError {
    /// Operation attempted after `Queue::close`
    #[error("Queue is closed")]
    QueueClosed,

    /// The caller's shutdown token fired while consuming
    #[error("Consume cancelled")]
    Cancelled,

    #[error("Failed to marshal field '{key}': {source}")]
    Marshal {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create stream '{stream}': {source}")]
    StreamCreate {
        stream: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to list consumer groups of stream '{stream}': {source}")]
    GroupList {
        stream: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to create consumer group '{group}' on stream '{stream}': {source}")]
    GroupCreate {
        stream: String,
        group: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to ack message {id}: {source}")]
    Ack {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("Background tasks did not stop within {0:?}")]
    WorkerTimeout(Duration),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),
}

impl QueueError {
    /// Stream/group provisioning failures are fatal to `consume`
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            QueueError::StreamCreate { .. }
                | QueueError::GroupList { .. }
                | QueueError::GroupCreate { .. }
        )
    }
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;
