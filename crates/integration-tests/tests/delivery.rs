//! Delivery Tests
//!
//! Publish, group consumption and ack behaviour against the in-memory store

mod common;

use common::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamq_core::domain::PLACEHOLDER_FIELD;
use streamq_core::port::{handler_fn, MessageHandler, StreamStore};
use streamq_core::{ConsumerOptions, Queue, QueueError, StreamOptions};

const WAIT: Duration = Duration::from_secs(3);

async fn publish_orders(queue: &Queue, count: u64) -> Vec<String> {
    let mut ids = Vec::new();
    for order_id in 1..=count {
        let id = queue
            .publish([("order_id", json!(order_id)), ("sku", json!("A-1"))])
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

async fn pending_count(queue: &Queue) -> u64 {
    queue.pending(GROUP).await.unwrap().count
}

/// Ten orders published before the consumer starts arrive in order and are all acked
#[tokio::test]
async fn test_backlog_delivered_in_order_and_acked() {
    let store = store();
    let q = queue(&store, "orders");
    publish_orders(&q, 10).await;

    let (handler, seen) = recording_handler();
    let (_tx, consumer) = spawn_consumer(&q, "c1", handler, fast_opts());

    assert!(eventually(WAIT, || async { seen.lock().unwrap().len() == 10 }).await);
    assert_eq!(order_ids(&seen), (1..=10).collect::<Vec<_>>());
    assert!(eventually(WAIT, || async { pending_count(&q).await == 0 }).await);

    q.close().await.unwrap();
    assert!(matches!(consumer.await.unwrap(), Err(QueueError::QueueClosed)));
}

/// Messages published while consuming are picked up by the blocking reader
#[tokio::test]
async fn test_live_messages_delivered() {
    let store = store();
    let q = queue(&store, "orders");
    let (handler, seen) = recording_handler();
    let (_tx, _consumer) = spawn_consumer(&q, "c1", handler, fast_opts());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let ids = publish_orders(&q, 3).await;

    assert!(eventually(WAIT, || async { seen.lock().unwrap().len() == 3 }).await);
    let delivered: Vec<String> = seen.lock().unwrap().iter().map(|m| m.id.clone()).collect();
    assert_eq!(delivered, ids);
    q.close().await.unwrap();
}

/// The bootstrap entry of a freshly created stream never reaches the handler
#[tokio::test]
async fn test_missing_stream_bootstrapped_without_handler_seeing_it() {
    let store = store();
    let q = queue(&store, "fresh");
    assert!(!store.stream_exists("fresh"));

    let (handler, seen) = recording_handler();
    let (_tx, _consumer) = spawn_consumer(&q, "c1", handler, fast_opts());

    assert!(eventually(WAIT, || async { store.stream_exists("fresh") }).await);
    publish_orders(&q, 2).await;

    assert!(eventually(WAIT, || async { seen.lock().unwrap().len() == 2 }).await);
    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .all(|m| m.get(PLACEHOLDER_FIELD).is_none()));
    // Placeholder plus two orders, all acked
    assert_eq!(store.stream_len("fresh"), 3);
    assert!(eventually(WAIT, || async { pending_count(&q).await == 0 }).await);
    q.close().await.unwrap();
}

/// Acked messages are not handed to later consumers of the same group
#[tokio::test]
async fn test_acked_messages_not_redelivered() {
    let store = store();
    let q = queue(&store, "orders");
    publish_orders(&q, 5).await;

    let (handler, first) = recording_handler();
    let (tx, consumer) = spawn_consumer(&q, "c1", handler, fast_opts());
    assert!(eventually(WAIT, || async { first.lock().unwrap().len() == 5 }).await);
    assert!(eventually(WAIT, || async { pending_count(&q).await == 0 }).await);
    tx.shutdown();
    assert!(matches!(consumer.await.unwrap(), Err(QueueError::Cancelled)));

    let opts = ConsumerOptions {
        min_idle_time: Duration::from_millis(20),
        ..fast_opts()
    };
    let (handler, second) = recording_handler();
    let (_tx, _consumer) = spawn_consumer(&q, "c2", handler, opts);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(second.lock().unwrap().is_empty());
    q.close().await.unwrap();
}

fn id_recorder(seen: Arc<Mutex<Vec<String>>>) -> impl MessageHandler + 'static {
    handler_fn(move |_ctx, msg| {
        let seen = Arc::clone(&seen);
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            seen.lock().unwrap().push(msg.id);
            Ok(())
        }
    })
}

/// Consumers sharing a group split the stream between them without overlap
#[tokio::test]
async fn test_group_members_share_work_without_duplicates() {
    let store = store();
    let q = queue(&store, "orders");

    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let opts = ConsumerOptions {
        batch_size: 2,
        ..fast_opts()
    };
    let (_ta, _ca) = spawn_consumer(&q, "a", id_recorder(seen_a.clone()), opts.clone());
    let (_tb, _cb) = spawn_consumer(&q, "b", id_recorder(seen_b.clone()), opts);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let published = publish_orders(&q, 20).await;

    assert!(
        eventually(WAIT, || async {
            seen_a.lock().unwrap().len() + seen_b.lock().unwrap().len() == 20
        })
        .await
    );
    let all: HashSet<String> = seen_a
        .lock()
        .unwrap()
        .iter()
        .chain(seen_b.lock().unwrap().iter())
        .cloned()
        .collect();
    assert_eq!(all, published.into_iter().collect::<HashSet<_>>());
    q.close().await.unwrap();
}

/// A worker pool runs handlers in parallel and still processes everything
#[tokio::test]
async fn test_worker_pool_runs_handlers_concurrently() {
    let store = store();
    let q = queue(&store, "orders");
    publish_orders(&q, 20).await;

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let handler = {
        let (in_flight, peak, done) = (in_flight.clone(), peak.clone(), done.clone());
        handler_fn(move |_ctx, _msg| {
            let (in_flight, peak, done) = (in_flight.clone(), peak.clone(), done.clone());
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let opts = ConsumerOptions {
        concurrent_size: 4,
        ..fast_opts()
    };
    let (_tx, _consumer) = spawn_consumer(&q, "pool", handler, opts);

    assert!(eventually(WAIT, || async { done.load(Ordering::SeqCst) == 20 }).await);
    assert!(peak.load(Ordering::SeqCst) > 1);
    assert!(eventually(WAIT, || async { pending_count(&q).await == 0 }).await);
    q.close().await.unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    sku: String,
    lines: Vec<u32>,
}

/// Structured values survive the trip through the stream as JSON
#[tokio::test]
async fn test_structured_values_decode_in_handler() {
    let store = store();
    let q = queue(&store, "orders");
    let order = Order {
        id: 42,
        sku: "B-7".to_string(),
        lines: vec![1, 2, 3],
    };
    q.publish([("order", &order)]).await.unwrap();

    let (handler, seen) = recording_handler();
    let (_tx, _consumer) = spawn_consumer(&q, "c1", handler, fast_opts());
    assert!(eventually(WAIT, || async { seen.lock().unwrap().len() == 1 }).await);

    let msg = seen.lock().unwrap()[0].clone();
    assert_eq!(msg.decode::<Order>("order").unwrap(), order);
    assert!(msg.decode::<Order>("missing").is_err());
    q.close().await.unwrap();
}

/// `max_len` bounds retention at publish time
#[tokio::test]
async fn test_publish_trims_stream() {
    let store = store();
    let q = Queue::new(
        store.clone(),
        "bounded",
        StreamOptions {
            max_len: 5,
            approximate_len: false,
            ..Default::default()
        },
    );
    let ids = publish_orders(&q, 20).await;
    assert_eq!(store.stream_len("bounded"), 5);

    // Ids keep increasing across the trim
    let mut sorted = ids.clone();
    sorted.sort_by_key(|id| id.parse::<streamq_core::domain::MessageId>().unwrap());
    assert_eq!(sorted, ids);

    assert!(StreamStore::list_groups(store.as_ref(), "bounded")
        .await
        .unwrap()
        .is_empty());
}
