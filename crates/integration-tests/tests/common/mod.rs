//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamq_core::port::{handler_fn, HandlerResult, MessageHandler};
use streamq_core::{
    shutdown_channel, ConsumerOptions, Queue, ShutdownSender, StreamMessage, StreamOptions,
};
use streamq_infra_memory::MemoryStreamStore;
use tokio::task::JoinHandle;

pub const GROUP: &str = "workers";

pub fn store() -> Arc<MemoryStreamStore> {
    Arc::new(MemoryStreamStore::new())
}

pub fn queue(store: &Arc<MemoryStreamStore>, stream: &str) -> Queue {
    Queue::new(
        store.clone(),
        stream,
        StreamOptions {
            close_timeout: Duration::from_secs(2),
            ..Default::default()
        },
    )
}

/// Short timings so loops react within tens of milliseconds
pub fn fast_opts() -> ConsumerOptions {
    ConsumerOptions {
        block_duration: Duration::from_millis(50),
        retry_delay: Duration::from_millis(10),
        min_idle_time: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Start `consume` on its own task; the sender cancels just this consumer
pub fn spawn_consumer<H>(
    queue: &Queue,
    consumer: &str,
    handler: H,
    opts: ConsumerOptions,
) -> (ShutdownSender, JoinHandle<streamq_core::Result<()>>)
where
    H: MessageHandler + 'static,
{
    let (tx, ctx) = shutdown_channel();
    let queue = queue.clone();
    let consumer = consumer.to_string();
    let handle =
        tokio::spawn(async move { queue.consume(ctx, GROUP, &consumer, handler, opts).await });
    (tx, handle)
}

/// Handler that records every message it sees, then succeeds
pub fn recording_handler() -> (impl MessageHandler + 'static, Arc<Mutex<Vec<StreamMessage>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = handler_fn(move |_ctx, msg| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(msg);
            HandlerResult::Ok(())
        }
    });
    (handler, seen)
}

/// Poll `check` until it holds or `limit` passes
pub async fn eventually<F, Fut>(limit: Duration, check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn order_ids(seen: &Mutex<Vec<StreamMessage>>) -> Vec<u64> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|m| m.decode::<u64>("order_id").unwrap())
        .collect()
}
