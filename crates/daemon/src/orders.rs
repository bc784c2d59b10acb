//! Demo workload: an order producer and a logging order handler

use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use streamq_core::port::{handler_fn, HandlerResult, MessageHandler};
use streamq_core::{Queue, QueueError, ShutdownToken, StreamMessage};
use tracing::{info, warn};

/// Publish a numbered order every `interval` until the queue closes or `ctx` fires
pub async fn produce(queue: Queue, ctx: ShutdownToken, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut order_id: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = ctx.wait() => break,
            _ = ticker.tick() => {}
        }

        order_id += 1;
        let result = queue
            .publish([
                ("order_id", json!(order_id)),
                ("sku", json!(format!("SKU-{}", order_id % 7))),
                ("quantity", json!(order_id % 3 + 1)),
            ])
            .await;

        match result {
            Ok(id) => info!(order_id = order_id, message_id = %id, "Order published"),
            Err(QueueError::QueueClosed) => break,
            Err(e) => warn!(order_id = order_id, error = %e, "Publish failed"),
        }
    }
    info!(published = order_id, "Producer stopped");
}

/// Handler that logs each order after `work` of simulated processing
///
/// With `fail_every > 0`, the first attempt at every Nth order fails so the
/// retry path shows up in the logs.
pub fn order_handler(work: Duration, fail_every: u64) -> impl MessageHandler + 'static {
    let failed_once = Arc::new(Mutex::new(HashSet::new()));

    handler_fn(move |ctx, msg| {
        let failed_once = Arc::clone(&failed_once);
        async move { handle_order(&ctx, &msg, work, fail_every, &failed_once).await }
    })
}

async fn handle_order(
    ctx: &ShutdownToken,
    msg: &StreamMessage,
    work: Duration,
    fail_every: u64,
    failed_once: &Mutex<HashSet<u64>>,
) -> HandlerResult {
    let order_id: u64 = msg.decode("order_id")?;
    let sku: String = msg.decode("sku")?;

    if fail_every > 0 && order_id % fail_every == 0 {
        let first_attempt = failed_once
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order_id);
        if first_attempt {
            return Err(format!("simulated failure for order {order_id}").into());
        }
    }

    tokio::select! {
        _ = ctx.wait() => return Err("interrupted by shutdown".into()),
        _ = tokio::time::sleep(work) => {}
    }

    info!(message_id = %msg.id, order_id = order_id, sku = %sku, "Order processed");
    Ok(())
}
