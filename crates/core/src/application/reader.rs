// Reader loop - long-polls new entries into the work channel

use crate::application::scope::{with_timeout, ConsumeScope};
use crate::domain::StreamMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Feeds never-delivered entries of the group to the workers
///
/// Owns the only strong `Sender` of the work channel: when `run` returns the
/// sender drops and the channel closes. Nothing else may close it.
pub(crate) struct Reader {
    scope: ConsumeScope,
    tx: mpsc::Sender<StreamMessage>,
}

impl Reader {
    pub fn new(scope: ConsumeScope, tx: mpsc::Sender<StreamMessage>) -> Self {
        Self { scope, tx }
    }

    pub async fn run(self) {
        let scope = &self.scope;
        info!(
            stream = %scope.stream,
            group = %scope.group,
            consumer = %scope.consumer,
            "Reader loop started"
        );

        // A zero block duration waits for data, so the call is left unbounded
        let read_limit = if scope.opts.block_duration.is_zero() {
            Duration::ZERO
        } else {
            scope.opts.block_duration + scope.read_timeout
        };

        'read: loop {
            let result = tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => break,
                result = with_timeout(
                    read_limit,
                    scope.store.read_group(
                        &scope.group,
                        &scope.consumer,
                        &scope.stream,
                        scope.opts.batch_size,
                        scope.opts.block_duration,
                    ),
                ) => result,
            };

            match result {
                Ok(entries) => {
                    debug!(count = entries.len(), "Read entries from stream");
                    for entry in entries {
                        let msg = StreamMessage::new(entry.id, entry.fields);
                        if !dispatch(&self.tx, &scope.cancel, msg).await {
                            break 'read;
                        }
                    }
                }
                Err(e) if e.is_no_data() => {}
                Err(e) => {
                    warn!(
                        stream = %scope.stream,
                        group = %scope.group,
                        error = %e,
                        "Group read failed, retrying"
                    );
                    tokio::select! {
                        _ = scope.cancel.cancelled() => break,
                        _ = sleep(scope.opts.retry_delay) => {}
                    }
                }
            }
        }

        drop(self.tx);
        info!(
            stream = %scope.stream,
            consumer = %scope.consumer,
            "Reader loop stopped"
        );
    }
}

/// Send one message, giving up when the scope is cancelled.
/// Returns false once nothing more should be sent.
pub(crate) async fn dispatch(
    tx: &mpsc::Sender<StreamMessage>,
    cancel: &CancellationToken,
    msg: StreamMessage,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(msg) => sent.is_ok(),
    }
}
