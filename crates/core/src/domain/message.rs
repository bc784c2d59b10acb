// Stream Message Domain Model

use super::error::{DomainError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Field written by the group manager when it has to create a missing stream.
/// Workers ack entries carrying it without invoking the handler.
pub const PLACEHOLDER_FIELD: &str = "__streamq_init";

/// Value stored under `PLACEHOLDER_FIELD` when bootstrapping a stream
pub const PLACEHOLDER_VALUE: &str = "\"init\"";

/// Store-assigned entry identifier in `<millis>-<sequence>` form
///
/// Ordering is numeric on both parts, so `"10-0" > "9-5"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId {
    pub ms: u64,
    pub seq: u64,
}

impl MessageId {
    pub const MIN: MessageId = MessageId { ms: 0, seq: 0 };
    pub const MAX: MessageId = MessageId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Smallest id strictly greater than `self`
    pub fn successor(self) -> Self {
        match self.seq.checked_add(1) {
            Some(seq) => Self { ms: self.ms, seq },
            None => Self {
                ms: self.ms.saturating_add(1),
                seq: 0,
            },
        }
    }

    /// Next id strictly greater than `self`, preferring the wall clock millis
    pub fn next(self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self { ms: now_ms, seq: 0 }
        } else {
            Self {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for MessageId {
    type Err = DomainError;

    /// Accepts `<ms>-<seq>`, a bare `<ms>`, and the range markers `-` / `+`
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "-" => return Ok(Self::MIN),
            "+" => return Ok(Self::MAX),
            _ => {}
        }

        let invalid = || DomainError::InvalidMessageId(s.to_string());
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };
        let ms = ms.parse::<u64>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self { ms, seq })
    }
}

/// A message delivered from the stream
///
/// Values hold the JSON text each field was published with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: String,
    pub values: HashMap<String, String>,
}

impl StreamMessage {
    pub fn new(id: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Raw JSON text of a field
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Deserialize a field back into the type it was published as
    pub fn decode<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        let raw = self
            .get(field)
            .ok_or_else(|| DomainError::FieldNotFound(field.to_string()))?;
        serde_json::from_str(raw).map_err(|source| DomainError::Decode {
            field: field.to_string(),
            source,
        })
    }

    /// Parsed form of the store-assigned id
    pub fn message_id(&self) -> Result<MessageId> {
        self.id.parse()
    }

    /// True for the entry used to bootstrap a missing stream
    ///
    /// Only an entry holding exactly the bootstrap field and value matches, so
    /// user messages that happen to carry the field name still get handled.
    pub fn is_placeholder(&self) -> bool {
        self.values.len() == 1
            && self.values.get(PLACEHOLDER_FIELD).map(String::as_str) == Some(PLACEHOLDER_VALUE)
    }
}
