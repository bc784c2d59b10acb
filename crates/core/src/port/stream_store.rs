// Stream Store Port (Interface)
// Append-only log with consumer groups, offered by an external store

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A blocking read timed out with nothing to deliver
    #[error("No data available")]
    NoData,

    #[error("No such stream: {0}")]
    NoSuchStream(String),

    #[error("No such consumer group '{group}' on stream '{stream}'")]
    NoGroup { stream: String, group: String },

    /// Consumer group creation raced with another creator
    #[error("Consumer group already exists: {0}")]
    AlreadyExists(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the error only means "nothing new yet"
    pub fn is_no_data(&self) -> bool {
        matches!(self, StoreError::NoData)
    }
}

/// Retention policy applied on append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    None,
    /// Keep at most `len` entries; `approximate` lets the store trim lazily
    MaxLen { len: usize, approximate: bool },
}

impl TrimPolicy {
    pub fn from_max_len(max_len: usize, approximate: bool) -> Self {
        if max_len == 0 {
            TrimPolicy::None
        } else {
            TrimPolicy::MaxLen {
                len: max_len,
                approximate,
            }
        }
    }
}

/// Where a new consumer group starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// Deliver the whole backlog
    Beginning,
    /// Only entries appended after creation
    Latest,
}

/// Inclusive id range; `-` and `+` are the open ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRange {
    pub start: String,
    pub end: String,
}

impl IdRange {
    pub fn full() -> Self {
        Self {
            start: "-".to_string(),
            end: "+".to_string(),
        }
    }

    /// From `start` (inclusive) to the end of the stream
    pub fn starting_at(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: "+".to_string(),
        }
    }
}

/// An entry as delivered by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Aggregate view of a group's pending entries list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSummary {
    pub count: u64,
    pub lowest: Option<String>,
    pub highest: Option<String>,
    /// Pending count per consumer
    pub consumers: Vec<(String, u64)>,
}

/// One pending entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: String,
    pub consumer: String,
    /// Time since the entry was last delivered
    pub idle: Duration,
    pub delivery_count: u64,
}

/// Stream store client
///
/// Implementations must be safe to share between the reader, the reclaimer
/// and every worker of a queue.
///
/// Implementations:
/// - MemoryStreamStore: in-process store (streamq-infra-memory)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Append an entry, returning its store-assigned id
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        trim: TrimPolicy,
    ) -> Result<String, StoreError>;

    /// Create a consumer group
    ///
    /// # Errors
    /// - StoreError::AlreadyExists if the group exists
    /// - StoreError::NoSuchStream if the stream does not exist
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart)
        -> Result<(), StoreError>;

    /// List consumer group names
    ///
    /// # Errors
    /// - StoreError::NoSuchStream if the stream does not exist
    async fn list_groups(&self, stream: &str) -> Result<Vec<String>, StoreError>;

    /// Read entries never delivered to the group, blocking up to `block`
    ///
    /// A zero `block` waits until data arrives.
    ///
    /// # Errors
    /// - StoreError::NoData when the wait elapses with nothing to deliver
    /// - StoreError::NoGroup if the group does not exist
    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError>;

    /// Acknowledge entries, returning how many left the pending list
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, StoreError>;

    async fn pending_summary(&self, stream: &str, group: &str)
        -> Result<PendingSummary, StoreError>;

    async fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        range: IdRange,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError>;

    /// Transfer pending entries idle for at least `min_idle` to `consumer`
    ///
    /// Entries that are no longer pending, not idle long enough or already
    /// trimmed from the stream are skipped.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[String],
    ) -> Result<Vec<StreamEntry>, StoreError>;
}
