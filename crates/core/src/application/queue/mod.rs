//! Queue - stream-backed work queue
//!
//! A `Queue` is bound to one stream for its lifetime:
//! - `publish`: serialize and append a message
//! - `consume`: run a consumer (reader, reclaimer, worker pool) in a group
//! - `close`: stop every loop and wait for them, bounded by `close_timeout`
//!
//! Lifecycle is monotonic: Idle -> Running -> Draining -> Closed. A closed
//! queue never reopens. Dropping the last handle fires the closed signal so
//! background loops cannot outlive their queue.

mod group;
mod publisher;

use crate::application::reader::Reader;
use crate::application::recovery::Reclaimer;
use crate::application::scope::{with_timeout, ConsumeScope};
use crate::application::worker::{ShutdownToken, Worker};
use crate::domain::{ConsumerOptions, StreamOptions};
use crate::error::{QueueError, Result};
use crate::port::{MessageHandler, PendingSummary, StreamStore};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Queue lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, no consumer started yet
    Idle,
    /// At least one consumer was started
    Running,
    /// `close` fired the closed signal and is waiting for tasks
    Draining,
    /// Every background task finished
    Closed,
}

impl LifecycleState {
    /// Whether publish/consume are still accepted
    pub fn accepts_work(self) -> bool {
        matches!(self, LifecycleState::Idle | LifecycleState::Running)
    }
}

/// Handle to a stream-backed work queue; clones share the same queue
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    store: Arc<dyn StreamStore>,
    stream: Arc<str>,
    opts: StreamOptions,
    state: Mutex<LifecycleState>,
    /// One-shot closed signal; every consume scope is a child of it
    closed: CancellationToken,
    tasks: TaskTracker,
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl Queue {
    /// Create a queue bound to `stream`
    pub fn new(store: Arc<dyn StreamStore>, stream: impl Into<String>, opts: StreamOptions) -> Self {
        let stream: String = stream.into();
        Self {
            inner: Arc::new(QueueInner {
                store,
                stream: Arc::from(stream),
                opts,
                state: Mutex::new(LifecycleState::Idle),
                closed: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.inner.stream
    }

    pub fn options(&self) -> &StreamOptions {
        &self.inner.opts
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    pub fn is_running(&self) -> bool {
        self.state().accepts_work()
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(QueueError::QueueClosed)
        }
    }

    /// Pending entries summary of a consumer group
    pub async fn pending(&self, group: &str) -> Result<PendingSummary> {
        self.ensure_running()?;
        let summary = with_timeout(
            self.inner.opts.read_timeout,
            self.inner.store.pending_summary(&self.inner.stream, group),
        )
        .await?;
        Ok(summary)
    }

    /// Consume the stream as `consumer` within `group`
    ///
    /// Provisions the group, then runs `opts.concurrent_size` workers, one
    /// reclaimer and one reader until `ctx` fires (`Cancelled`) or the queue
    /// is closed (`QueueClosed`). Handlers already running are not
    /// interrupted; they see the cancellation through their token.
    ///
    /// # Errors
    /// - QueueError::QueueClosed if called after `close`
    /// - QueueError::Domain for invalid options
    /// - Provisioning errors (StreamCreate, GroupList, GroupCreate)
    pub async fn consume<H>(
        &self,
        ctx: ShutdownToken,
        group: &str,
        consumer: &str,
        handler: H,
        opts: ConsumerOptions,
    ) -> Result<()>
    where
        H: MessageHandler + 'static,
    {
        self.ensure_running()?;
        opts.validate()?;
        self.create_consumer_group(group).await?;

        let run = self.inner.closed.child_token();
        // Stops the loops if this future is dropped before returning
        let _guard = run.clone().drop_guard();

        let scope = ConsumeScope {
            store: Arc::clone(&self.inner.store),
            stream: Arc::clone(&self.inner.stream),
            group: Arc::from(group),
            consumer: Arc::from(consumer),
            opts: opts.clone(),
            read_timeout: self.inner.opts.read_timeout,
            cancel: run.clone(),
        };
        let handler: Arc<dyn MessageHandler> = Arc::new(handler);

        {
            // Spawning under the state lock keeps close() from missing these tasks
            let mut state = self.lock_state();
            if !state.accepts_work() {
                return Err(QueueError::QueueClosed);
            }
            *state = LifecycleState::Running;

            let (tx, rx) = mpsc::channel(opts.batch_size);
            let rx = Arc::new(tokio::sync::Mutex::new(rx));
            for id in 0..opts.concurrent_size {
                let worker = Worker::new(id, scope.clone(), Arc::clone(&handler), Arc::clone(&rx));
                self.inner.tasks.spawn(worker.run());
            }
            self.inner
                .tasks
                .spawn(Reclaimer::new(scope.clone(), tx.downgrade()).run());
            self.inner.tasks.spawn(Reader::new(scope, tx).run());
        }

        info!(
            stream = %self.inner.stream,
            group = %group,
            consumer = %consumer,
            workers = opts.concurrent_size,
            batch_size = opts.batch_size,
            "Consumer started"
        );

        tokio::select! {
            _ = ctx.wait() => {
                run.cancel();
                info!(group = %group, consumer = %consumer, "Consumer cancelled");
                Err(QueueError::Cancelled)
            }
            _ = self.inner.closed.cancelled() => {
                info!(group = %group, consumer = %consumer, "Consumer stopped by queue close");
                Err(QueueError::QueueClosed)
            }
        }
    }

    /// Stop every consumer of this queue and wait for their tasks
    ///
    /// Idempotent. Fires the closed signal once, then waits up to
    /// `close_timeout` (zero waits indefinitely).
    ///
    /// # Errors
    /// - QueueError::WorkerTimeout if tasks are still running at the deadline;
    ///   they have been signalled and finish on their own
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.accepts_work() {
                *state = LifecycleState::Draining;
                self.inner.closed.cancel();
                self.inner.tasks.close();
                info!(stream = %self.inner.stream, "Closing queue");
            }
        }

        let limit = self.inner.opts.close_timeout;
        let drained = if limit.is_zero() {
            self.inner.tasks.wait().await;
            true
        } else {
            tokio::time::timeout(limit, self.inner.tasks.wait())
                .await
                .is_ok()
        };

        if !drained {
            warn!(
                stream = %self.inner.stream,
                remaining_tasks = self.inner.tasks.len(),
                timeout_ms = limit.as_millis() as u64,
                "Queue close timed out"
            );
            return Err(QueueError::WorkerTimeout(limit));
        }

        *self.lock_state() = LifecycleState::Closed;
        info!(stream = %self.inner.stream, "Queue closed");
        Ok(())
    }
}
