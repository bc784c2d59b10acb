// Message Handler Port
// Business-logic callback supplied per `Queue::consume`

use crate::application::ShutdownToken;
use crate::domain::StreamMessage;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Error returned by a handler; any error type works
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<(), HandlerError>;

/// Processes one delivered message
///
/// `Ok` acks the message. `Err` schedules a retry in place until the
/// consumer's `max_retries` is exhausted, after which the message is left
/// pending. The token fires when consumption stops; long-running handlers
/// should watch it since they are never preempted.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &ShutdownToken, msg: &StreamMessage) -> HandlerResult;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn handle(&self, ctx: &ShutdownToken, msg: &StreamMessage) -> HandlerResult {
        (**self).handle(ctx, msg).await
    }
}

/// Handler backed by an async closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`]
///
/// ```text
/// let handler = handler_fn(|_ctx, msg| async move {
///     tracing::info!(id = %msg.id, "got message");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ShutdownToken, StreamMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(ShutdownToken, StreamMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: &ShutdownToken, msg: &StreamMessage) -> HandlerResult {
        (self.f)(ctx.clone(), msg.clone()).await
    }
}
