// Consumer group provisioning

use super::Queue;
use crate::application::scope::with_timeout;
use crate::domain::{PLACEHOLDER_FIELD, PLACEHOLDER_VALUE};
use crate::error::{QueueError, Result};
use crate::port::{GroupStart, StoreError, TrimPolicy};
use tracing::{debug, info};

impl Queue {
    /// Make sure `group` exists on the stream, creating both when needed
    ///
    /// Idempotent: an existing group, found by listing or reported by a
    /// concurrent creator, counts as success. A missing stream is created
    /// with a placeholder entry first; new groups start at the beginning so
    /// the whole backlog is delivered.
    pub(crate) async fn create_consumer_group(&self, group: &str) -> Result<()> {
        let store = &self.inner.store;
        let stream: &str = &self.inner.stream;
        let read_timeout = self.inner.opts.read_timeout;

        match with_timeout(read_timeout, store.list_groups(stream)).await {
            Ok(groups) if groups.iter().any(|g| g == group) => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
                return Ok(());
            }
            Ok(_) => {}
            Err(StoreError::NoSuchStream(_)) => {
                let placeholder = [(PLACEHOLDER_FIELD.to_string(), PLACEHOLDER_VALUE.to_string())];
                with_timeout(
                    self.inner.opts.write_timeout,
                    store.append(stream, &placeholder, TrimPolicy::None),
                )
                .await
                .map_err(|source| QueueError::StreamCreate {
                    stream: stream.to_string(),
                    source,
                })?;
                info!(stream = %stream, "Created stream");
            }
            Err(source) => {
                return Err(QueueError::GroupList {
                    stream: stream.to_string(),
                    source,
                })
            }
        }

        match with_timeout(
            read_timeout,
            store.create_group(stream, group, GroupStart::Beginning),
        )
        .await
        {
            Ok(()) => {
                info!(stream = %stream, group = %group, "Created consumer group");
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(stream = %stream, group = %group, "Consumer group created concurrently");
                Ok(())
            }
            Err(source) => Err(QueueError::GroupCreate {
                stream: stream.to_string(),
                group: group.to_string(),
                source,
            }),
        }
    }
}
