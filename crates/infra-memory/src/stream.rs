// Stream state: entries, consumer groups and their pending entries lists

use streamq_core::domain::MessageId;
use streamq_core::port::{
    GroupStart, PendingEntry, PendingSummary, StoreError, StreamEntry, TrimPolicy,
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::Duration;
use tokio::time::Instant;

/// Extra entries an approximate trim lets accumulate before cutting back
pub const TRIM_CHUNK: usize = 100;

type Fields = HashMap<String, String>;

/// Delivery record of a pending entry
#[derive(Debug, Clone)]
struct PendingInfo {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: MessageId,
    pending: BTreeMap<MessageId, PendingInfo>,
}

/// One stream and its consumer groups
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    entries: BTreeMap<MessageId, Fields>,
    last_id: MessageId,
    groups: BTreeMap<String, GroupState>,
}

pub(crate) fn parse_id(id: &str) -> Result<MessageId, StoreError> {
    id.parse()
        .map_err(|_| StoreError::Backend(format!("Invalid stream ID specified: {id}")))
}

fn no_group(stream: &str, group: &str) -> StoreError {
    StoreError::NoGroup {
        stream: stream.to_string(),
        group: group.to_string(),
    }
}

impl StreamState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append with an id strictly greater than every previous one
    pub fn append(&mut self, fields: Fields, now_ms: u64) -> MessageId {
        let id = self.last_id.next(now_ms);
        self.entries.insert(id, fields);
        self.last_id = id;
        id
    }

    /// Apply a retention policy, returning how many entries were evicted
    pub fn trim(&mut self, policy: TrimPolicy) -> usize {
        let TrimPolicy::MaxLen { len, approximate } = policy else {
            return 0;
        };
        let threshold = if approximate { len + TRIM_CHUNK } else { len + 1 };
        if self.entries.len() < threshold {
            return 0;
        }

        let excess = self.entries.len() - len;
        for _ in 0..excess {
            self.entries.pop_first();
        }
        excess
    }

    pub fn create_group(
        &mut self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), StoreError> {
        if self.groups.contains_key(group) {
            return Err(StoreError::AlreadyExists(format!("{stream}/{group}")));
        }
        let last_delivered = match start {
            GroupStart::Beginning => MessageId::MIN,
            GroupStart::Latest => self.last_id,
        };
        self.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Deliver up to `count` never-delivered entries (0 = all) to `consumer`
    pub fn read_new(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        now: Instant,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let state = self
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;
        let limit = if count == 0 { usize::MAX } else { count };

        let mut delivered = Vec::new();
        let range = (Bound::Excluded(state.last_delivered), Bound::Unbounded);
        for (id, fields) in self.entries.range(range).take(limit) {
            state.pending.insert(
                *id,
                PendingInfo {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            state.last_delivered = *id;
            delivered.push(StreamEntry {
                id: id.to_string(),
                fields: fields.clone(),
            });
        }
        Ok(delivered)
    }

    pub fn ack(&mut self, stream: &str, group: &str, ids: &[String]) -> Result<u64, StoreError> {
        let state = self
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;
        let mut acked = 0;
        for id in ids {
            if state.pending.remove(&parse_id(id)?).is_some() {
                acked += 1;
            }
        }
        Ok(acked)
    }

    pub fn pending_summary(&self, stream: &str, group: &str) -> Result<PendingSummary, StoreError> {
        let state = self
            .groups
            .get(group)
            .ok_or_else(|| no_group(stream, group))?;

        let mut per_consumer: BTreeMap<&str, u64> = BTreeMap::new();
        for info in state.pending.values() {
            *per_consumer.entry(info.consumer.as_str()).or_default() += 1;
        }
        Ok(PendingSummary {
            count: state.pending.len() as u64,
            lowest: state.pending.keys().next().map(ToString::to_string),
            highest: state.pending.keys().next_back().map(ToString::to_string),
            consumers: per_consumer
                .into_iter()
                .map(|(name, n)| (name.to_string(), n))
                .collect(),
        })
    }

    pub fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        start: MessageId,
        end: MessageId,
        count: usize,
        now: Instant,
    ) -> Result<Vec<PendingEntry>, StoreError> {
        let state = self
            .groups
            .get(group)
            .ok_or_else(|| no_group(stream, group))?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(state
            .pending
            .range(start..=end)
            .take(count)
            .map(|(id, info)| PendingEntry {
                id: id.to_string(),
                consumer: info.consumer.clone(),
                idle: now.saturating_duration_since(info.delivered_at),
                delivery_count: info.delivery_count,
            })
            .collect())
    }

    /// Take over pending entries idle for at least `min_idle`
    ///
    /// Entries trimmed away since delivery are dropped from the pending list.
    pub fn claim(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[String],
        now: Instant,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let parsed = ids
            .iter()
            .map(|id| parse_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        let state = self
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let mut claimed = Vec::new();
        for id in parsed {
            let Some(fields) = self.entries.get(&id) else {
                state.pending.remove(&id);
                continue;
            };
            let Some(info) = state.pending.get_mut(&id) else {
                continue;
            };
            if now.saturating_duration_since(info.delivered_at) < min_idle {
                continue;
            }
            info.consumer = consumer.to_string();
            info.delivered_at = now;
            info.delivery_count += 1;
            claimed.push(StreamEntry {
                id: id.to_string(),
                fields: fields.clone(),
            });
        }
        Ok(claimed)
    }
}
