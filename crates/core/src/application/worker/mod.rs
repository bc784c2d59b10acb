// Worker - drains the work channel and runs the handler

pub mod constants;
mod shutdown; // Public for use in other modules

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::scope::{with_timeout, ConsumeScope};
use crate::domain::StreamMessage;
use crate::port::{HandlerResult, MessageHandler};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// How processing of one message ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handler succeeded and the ack went through
    Acked { attempts: u32 },
    /// Handler succeeded but the ack failed; the message stays pending
    AckFailed { attempts: u32 },
    /// Retries exhausted; left pending without ack
    Abandoned { attempts: u32 },
    /// Shutdown arrived during a retry wait
    Interrupted { attempts: u32 },
    /// Stream bootstrap entry, acked without reaching the handler
    Skipped,
}

/// One member of the worker pool of a `consume` call
pub(crate) struct Worker {
    id: usize,
    scope: ConsumeScope,
    handler: Arc<dyn MessageHandler>,
    rx: Arc<Mutex<mpsc::Receiver<StreamMessage>>>,
    retry_policy: RetryPolicy,
}

impl Worker {
    pub fn new(
        id: usize,
        scope: ConsumeScope,
        handler: Arc<dyn MessageHandler>,
        rx: Arc<Mutex<mpsc::Receiver<StreamMessage>>>,
    ) -> Self {
        let retry_policy = RetryPolicy::from_options(&scope.opts);
        Self {
            id,
            scope,
            handler,
            rx,
            retry_policy,
        }
    }

    /// Receive and process messages until the channel closes or the scope is cancelled
    pub async fn run(self) {
        info!(
            worker = self.id,
            consumer = %self.scope.consumer,
            "Worker started"
        );
        loop {
            let next = {
                let mut rx = tokio::select! {
                    biased;
                    _ = self.scope.cancel.cancelled() => break,
                    rx = self.rx.lock() => rx,
                };
                tokio::select! {
                    biased;
                    _ = self.scope.cancel.cancelled() => break,
                    msg = rx.recv() => msg,
                }
            };

            let Some(msg) = next else {
                debug!(worker = self.id, "Work channel closed");
                break;
            };
            let outcome = process_message(&self.scope, &self.handler, &self.retry_policy, msg).await;
            debug!(worker = self.id, outcome = ?outcome, "Message processed");
        }
        info!(
            worker = self.id,
            consumer = %self.scope.consumer,
            "Worker stopped"
        );
    }
}

/// Run the handler on one message, retrying in place, then ack or abandon
///
/// `Delivered -> Processing -> {Acked | RetryWait -> Processing | Abandoned}`
pub(crate) async fn process_message(
    scope: &ConsumeScope,
    handler: &Arc<dyn MessageHandler>,
    retry_policy: &RetryPolicy,
    msg: StreamMessage,
) -> ProcessOutcome {
    if msg.is_placeholder() {
        debug!(message_id = %msg.id, "Skipping stream bootstrap entry");
        ack(scope, &msg.id).await;
        return ProcessOutcome::Skipped;
    }

    let ctx = ShutdownToken::from(scope.cancel.clone());
    let mut failures: u32 = 0;
    loop {
        match invoke(handler, &ctx, &msg).await {
            Ok(()) => {
                let attempts = failures + 1;
                return if ack(scope, &msg.id).await {
                    ProcessOutcome::Acked { attempts }
                } else {
                    ProcessOutcome::AckFailed { attempts }
                };
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                match retry_policy.should_retry(&msg.id, failures) {
                    RetryDecision::Retry(delay) => {
                        warn!(
                            message_id = %msg.id,
                            attempt = failures,
                            error = %e,
                            "Handler failed, retrying"
                        );
                        tokio::select! {
                            _ = scope.cancel.cancelled() => {
                                return ProcessOutcome::Interrupted { attempts: failures };
                            }
                            _ = sleep(delay) => {}
                        }
                    }
                    RetryDecision::Abandon => {
                        // TODO: route exhausted messages to a dead-letter stream; today they
                        // stay pending and the reclaimer hands them out again with a fresh count
                        error!(
                            stream = %scope.stream,
                            group = %scope.group,
                            message_id = %msg.id,
                            attempts = failures,
                            max_attempts = ?retry_policy.max_attempts(),
                            error = %e,
                            "Handler retries exhausted, message left pending"
                        );
                        return ProcessOutcome::Abandoned { attempts: failures };
                    }
                }
            }
        }
    }
}

/// Call the handler on its own task so a panic only fails this attempt
async fn invoke(
    handler: &Arc<dyn MessageHandler>,
    ctx: &ShutdownToken,
    msg: &StreamMessage,
) -> HandlerResult {
    let handler = Arc::clone(handler);
    let ctx = ctx.clone();
    let msg = msg.clone();
    match tokio::task::spawn(async move { handler.handle(&ctx, &msg).await }).await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            error!(error = ?join_err, "Message handler panicked");
            Err("message handler panicked".into())
        }
        Err(join_err) => Err(format!("message handler cancelled: {join_err}").into()),
    }
}

/// Best-effort ack; failures are logged and leave the message pending
async fn ack(scope: &ConsumeScope, id: &str) -> bool {
    let ids = [id.to_string()];
    match with_timeout(
        scope.read_timeout,
        scope.store.ack(&scope.stream, &scope.group, &ids),
    )
    .await
    {
        Ok(_) => {
            debug!(message_id = %id, "Message acked");
            true
        }
        Err(e) => {
            let err = crate::error::QueueError::Ack {
                id: id.to_string(),
                source: e,
            };
            error!(
                stream = %scope.stream,
                group = %scope.group,
                error = %err,
                "Ack failed"
            );
            false
        }
    }
}
