// State shared by the loops of one `consume` call

use crate::domain::ConsumerOptions;
use crate::port::{StoreError, StreamStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Store handle, names and options of a running consumer
///
/// `cancel` fires when the caller's token fires, when the queue closes, or
/// when the `consume` future is dropped.
#[derive(Clone)]
pub struct ConsumeScope {
    pub store: Arc<dyn StreamStore>,
    pub stream: Arc<str>,
    pub group: Arc<str>,
    pub consumer: Arc<str>,
    pub opts: ConsumerOptions,
    pub read_timeout: Duration,
    pub cancel: CancellationToken,
}

/// Bound a store call; a zero limit waits indefinitely
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if limit.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
