// Application Layer - Queue services and background loops

pub mod queue;
mod reader;
mod recovery;
pub mod retry;
mod scope;
pub mod worker;

// Re-exports
pub use queue::{LifecycleState, Queue};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, ProcessOutcome, ShutdownSender, ShutdownToken};
