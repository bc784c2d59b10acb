// Crash recovery - reclaims messages stuck with dead or stalled consumers

use crate::application::reader::dispatch;
use crate::application::scope::{with_timeout, ConsumeScope};
use crate::application::worker::constants::MAX_RECLAIM_BATCH;
use crate::domain::{MessageId, StreamMessage};
use crate::port::{IdRange, PendingEntry, StoreError};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pending entry reclaimer
///
/// Every `min_idle_time / 2` it looks at the group's pending entries and
/// claims those idle for at least `min_idle_time` for this consumer, feeding
/// them to the same work channel as the reader. A message therefore waits at
/// most about `min_idle_time` behind a consumer that died before acking.
///
/// Holds only a weak sender so the reader stays the channel's sole closer;
/// when the upgrade fails the channel is gone and the loop ends.
pub(crate) struct Reclaimer {
    scope: ConsumeScope,
    tx: mpsc::WeakSender<StreamMessage>,
}

impl Reclaimer {
    pub fn new(scope: ConsumeScope, tx: mpsc::WeakSender<StreamMessage>) -> Self {
        Self { scope, tx }
    }

    pub async fn run(self) {
        let period = self.scope.opts.reclaim_interval();
        info!(
            stream = %self.scope.stream,
            group = %self.scope.group,
            consumer = %self.scope.consumer,
            interval_ms = period.as_millis() as u64,
            "Reclaimer started"
        );

        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.scope.cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            match self.reclaim_once().await {
                Ok(0) => {}
                Ok(count) => info!(
                    stream = %self.scope.stream,
                    group = %self.scope.group,
                    reclaimed = count,
                    "Reclaimed idle pending messages"
                ),
                Err(e) => warn!(
                    stream = %self.scope.stream,
                    group = %self.scope.group,
                    error = %e,
                    "Reclaim pass failed"
                ),
            }

            if self.tx.upgrade().is_none() {
                debug!("Work channel closed, reclaimer exiting");
                break;
            }
        }

        info!(
            stream = %self.scope.stream,
            consumer = %self.scope.consumer,
            "Reclaimer stopped"
        );
    }

    /// One reclaim pass, returning how many messages were re-injected
    ///
    /// Walks the whole pending list in pages of at most `MAX_RECLAIM_BATCH`,
    /// claiming and dispatching the idle entries of each page.
    pub async fn reclaim_once(&self) -> Result<usize, StoreError> {
        let scope = &self.scope;

        let summary = with_timeout(
            scope.read_timeout,
            scope.store.pending_summary(&scope.stream, &scope.group),
        )
        .await?;
        let mut remaining = summary.count as usize;
        let mut range = IdRange::full();
        let mut delivered = 0;

        while remaining > 0 && !scope.cancel.is_cancelled() {
            let page_size = remaining.min(MAX_RECLAIM_BATCH);
            let page = with_timeout(
                scope.read_timeout,
                scope
                    .store
                    .pending_detail(&scope.stream, &scope.group, range.clone(), page_size),
            )
            .await?;
            let Some(last) = page.last().map(|entry| entry.id.clone()) else {
                break;
            };
            let exhausted = page.len() < page_size;
            remaining = remaining.saturating_sub(page.len());

            match self.claim_idle(page).await? {
                Some(count) => delivered += count,
                None => break,
            }
            if exhausted {
                break;
            }
            range = IdRange::starting_at(next_id(&last)?);
        }
        Ok(delivered)
    }

    /// Claim the idle entries of one page and feed them to the workers
    ///
    /// `None` means the work channel is gone or the consumer was cancelled.
    async fn claim_idle(&self, page: Vec<PendingEntry>) -> Result<Option<usize>, StoreError> {
        let scope = &self.scope;
        let min_idle = scope.opts.min_idle_time;

        let idle_ids: Vec<String> = page
            .into_iter()
            .filter(|entry| entry.idle >= min_idle)
            .map(|entry| {
                debug!(
                    message_id = %entry.id,
                    owner = %entry.consumer,
                    idle_ms = entry.idle.as_millis() as u64,
                    deliveries = entry.delivery_count,
                    "Pending message eligible for reclaim"
                );
                entry.id
            })
            .collect();
        if idle_ids.is_empty() {
            return Ok(Some(0));
        }

        if scope.cancel.is_cancelled() {
            return Ok(None);
        }
        let claimed = with_timeout(
            scope.read_timeout,
            scope.store.claim(
                &scope.stream,
                &scope.group,
                &scope.consumer,
                min_idle,
                &idle_ids,
            ),
        )
        .await?;

        let Some(tx) = self.tx.upgrade() else {
            return Ok(None);
        };
        let mut delivered = 0;
        for entry in claimed {
            let msg = StreamMessage::new(entry.id, entry.fields);
            if !dispatch(&tx, &scope.cancel, msg).await {
                return Ok(None);
            }
            delivered += 1;
        }
        Ok(Some(delivered))
    }
}

/// First id after `last`, where the next page starts
fn next_id(last: &str) -> Result<String, StoreError> {
    let id: MessageId = last
        .parse()
        .map_err(|e| StoreError::Backend(format!("Invalid pending entry id '{last}': {e}")))?;
    Ok(id.successor().to_string())
}
