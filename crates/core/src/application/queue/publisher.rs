// Publisher - serialize fields and append to the stream

use super::Queue;
use crate::application::scope::with_timeout;
use crate::error::{QueueError, Result};
use crate::port::TrimPolicy;
use serde::Serialize;
use tracing::debug;

impl Queue {
    /// Publish one message, returning its store-assigned id
    ///
    /// Every value is serialized to JSON on its own; a failure names the
    /// offending key. When `max_len` is set the stream is trimmed to about
    /// that many entries.
    ///
    /// # Example
    /// ```text
    /// let id = queue
    ///     .publish([("order_id", json!(42)), ("sku", json!("A-1"))])
    ///     .await?;
    /// ```
    ///
    /// # Errors
    /// - QueueError::QueueClosed after `close`
    /// - QueueError::Marshal if a value cannot be serialized
    /// - QueueError::Store on append failure or `write_timeout`
    pub async fn publish<I, K, V>(&self, values: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        self.ensure_running()?;
        let fields = encode_fields(values)?;

        let opts = &self.inner.opts;
        let trim = TrimPolicy::from_max_len(opts.max_len, opts.approximate_len);
        let id = with_timeout(
            opts.write_timeout,
            self.inner.store.append(&self.inner.stream, &fields, trim),
        )
        .await?;

        debug!(stream = %self.inner.stream, message_id = %id, "Message published");
        Ok(id)
    }
}

/// Serialize each value independently
pub(crate) fn encode_fields<I, K, V>(values: I) -> Result<Vec<(String, String)>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Serialize,
{
    values
        .into_iter()
        .map(|(key, value)| {
            let key = key.into();
            match serde_json::to_string(&value) {
                Ok(encoded) => Ok((key, encoded)),
                Err(source) => Err(QueueError::Marshal { key, source }),
            }
        })
        .collect()
}
