// In-memory StreamStore Implementation

use crate::stream::{parse_id, StreamState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use streamq_core::port::{
    GroupStart, IdRange, PendingEntry, PendingSummary, StoreError, StreamEntry, StreamStore,
    SystemTimeProvider, TimeProvider, TrimPolicy,
};
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

/// Process-local stream store with consumer-group semantics
///
/// Shared freely between tasks; blocking group reads are woken by appends.
pub struct MemoryStreamStore {
    streams: Mutex<HashMap<String, StreamState>>,
    appended: Notify,
    time_provider: Arc<dyn TimeProvider>,
}

impl Default for MemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::with_time_provider(Arc::new(SystemTimeProvider))
    }

    /// Use a custom clock for id generation (deterministic tests)
    pub fn with_time_provider(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
            time_provider,
        }
    }

    /// Number of entries currently retained in `stream` (0 if missing)
    pub fn stream_len(&self, stream: &str) -> usize {
        self.lock().get(stream).map(StreamState::len).unwrap_or(0)
    }

    pub fn stream_exists(&self, stream: &str) -> bool {
        self.lock().contains_key(stream)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamState>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> u64 {
        self.time_provider.now_millis().max(0) as u64
    }

    /// Run `f` against an existing stream; missing streams have no groups
    fn with_group_stream<T>(
        &self,
        stream: &str,
        group: &str,
        f: impl FnOnce(&mut StreamState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut streams = self.lock();
        let state = streams.get_mut(stream).ok_or_else(|| StoreError::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })?;
        f(state)
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        trim: TrimPolicy,
    ) -> Result<String, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::Backend(
                "An entry needs at least one field".to_string(),
            ));
        }

        let id = {
            let mut streams = self.lock();
            let state = streams.entry(stream.to_string()).or_default();
            let id = state.append(fields.iter().cloned().collect(), self.now_ms());
            let evicted = state.trim(trim);
            if evicted > 0 {
                debug!(stream = %stream, evicted = evicted, "Trimmed stream");
            }
            id
        };
        self.appended.notify_waiters();
        trace!(stream = %stream, id = %id, "Appended entry");
        Ok(id.to_string())
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), StoreError> {
        let mut streams = self.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StoreError::NoSuchStream(stream.to_string()))?;
        state.create_group(stream, group, start)
    }

    async fn list_groups(&self, stream: &str) -> Result<Vec<String>, StoreError> {
        self.lock()
            .get(stream)
            .map(StreamState::group_names)
            .ok_or_else(|| StoreError::NoSuchStream(stream.to_string()))
    }

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let deadline = (!block.is_zero()).then(|| Instant::now() + block);

        loop {
            // Register for wakeups before looking, so an append in between is not missed
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entries = self.with_group_stream(stream, group, |state| {
                state.read_new(stream, group, consumer, count, Instant::now())
            })?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return Err(StoreError::NoData);
                    }
                }
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, StoreError> {
        self.with_group_stream(stream, group, |state| state.ack(stream, group, ids))
    }

    async fn pending_summary(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<PendingSummary, StoreError> {
        self.with_group_stream(stream, group, |state| state.pending_summary(stream, group))
    }

    async fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        range: IdRange,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError> {
        let start = parse_id(&range.start)?;
        let end = parse_id(&range.end)?;
        self.with_group_stream(stream, group, |state| {
            state.pending_detail(stream, group, start, end, count, Instant::now())
        })
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[String],
    ) -> Result<Vec<StreamEntry>, StoreError> {
        self.with_group_stream(stream, group, |state| {
            state.claim(stream, group, consumer, min_idle, ids, Instant::now())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamq_core::port::ManualTimeProvider;

    fn fields(n: usize) -> Vec<(String, String)> {
        vec![("n".to_string(), n.to_string())]
    }

    #[tokio::test]
    async fn test_append_uses_clock_for_ids() {
        let clock = Arc::new(ManualTimeProvider::new(5_000));
        let store = MemoryStreamStore::with_time_provider(clock.clone());

        let a = store.append("s", &fields(0), TrimPolicy::None).await.unwrap();
        let b = store.append("s", &fields(1), TrimPolicy::None).await.unwrap();
        clock.advance(10);
        let c = store.append("s", &fields(2), TrimPolicy::None).await.unwrap();

        assert_eq!(a, "5000-0");
        assert_eq!(b, "5000-1");
        assert_eq!(c, "5010-0");
        assert_eq!(store.stream_len("s"), 3);
    }

    #[tokio::test]
    async fn test_empty_entry_rejected() {
        let store = MemoryStreamStore::new();
        let err = store.append("s", &[], TrimPolicy::None).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!store.stream_exists("s"));
    }

    #[tokio::test]
    async fn test_groups_need_an_existing_stream() {
        let store = MemoryStreamStore::new();
        assert!(matches!(
            store.list_groups("s").await,
            Err(StoreError::NoSuchStream(_))
        ));
        assert!(matches!(
            store.create_group("s", "g", GroupStart::Beginning).await,
            Err(StoreError::NoSuchStream(_))
        ));

        store.append("s", &fields(0), TrimPolicy::None).await.unwrap();
        tokio_test::assert_ok!(store.create_group("s", "g", GroupStart::Beginning).await);
        assert_eq!(store.list_groups("s").await.unwrap(), vec!["g".to_string()]);
    }

    #[tokio::test]
    async fn test_read_group_times_out_with_no_data() {
        let store = MemoryStreamStore::new();
        store.append("s", &fields(0), TrimPolicy::None).await.unwrap();
        store.create_group("s", "g", GroupStart::Latest).await.unwrap();

        let err = store
            .read_group("g", "c", "s", 10, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_no_data());
    }

    #[tokio::test]
    async fn test_read_group_without_group_is_nogroup() {
        let store = MemoryStreamStore::new();
        let err = store
            .read_group("g", "c", "missing", 10, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoGroup { .. }));
    }

    #[tokio::test]
    async fn test_blocking_read_woken_by_append() {
        let store = Arc::new(MemoryStreamStore::new());
        store.append("s", &fields(0), TrimPolicy::None).await.unwrap();
        store.create_group("s", "g", GroupStart::Latest).await.unwrap();

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .read_group("g", "c", "s", 10, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = store.append("s", &fields(1), TrimPolicy::None).await.unwrap();

        let entries = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].fields.get("n").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_pending_detail_over_full_range_and_claim() {
        let store = MemoryStreamStore::new();
        for i in 0..3 {
            store.append("s", &fields(i), TrimPolicy::None).await.unwrap();
        }
        store
            .create_group("s", "g", GroupStart::Beginning)
            .await
            .unwrap();
        let delivered = store
            .read_group("g", "dead", "s", 2, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let pending = store
            .pending_detail("s", "g", IdRange::full(), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|p| p.idle >= Duration::from_millis(30)));

        let ids: Vec<String> = pending.iter().map(|p| p.id.clone()).collect();
        let claimed = store
            .claim("s", "g", "live", Duration::from_millis(30), &ids)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);

        let summary = store.pending_summary("s", "g").await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.consumers, vec![("live".to_string(), 2)]);

        assert_eq!(store.ack("s", "g", &ids).await.unwrap(), 2);
        assert_eq!(store.pending_summary("s", "g").await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_append_trims_to_max_len() {
        let store = MemoryStreamStore::new();
        let exact = TrimPolicy::MaxLen {
            len: 3,
            approximate: false,
        };
        for i in 0..10 {
            store.append("s", &fields(i), exact).await.unwrap();
        }
        assert_eq!(store.stream_len("s"), 3);

        let approx = TrimPolicy::MaxLen {
            len: 3,
            approximate: true,
        };
        for i in 0..10 {
            store.append("t", &fields(i), approx).await.unwrap();
        }
        // Approximate trimming keeps at least max_len entries
        assert_eq!(store.stream_len("t"), 10);
    }
}
