// Port Layer - Interfaces for external collaborators

pub mod handler;
pub mod stream_store;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use handler::{handler_fn, FnHandler, HandlerError, HandlerResult, MessageHandler};
pub use stream_store::{
    GroupStart, IdRange, PendingEntry, PendingSummary, StoreError, StreamEntry, StreamStore,
    TrimPolicy,
};
pub use time_provider::{ManualTimeProvider, SystemTimeProvider, TimeProvider};

#[cfg(test)]
pub use stream_store::MockStreamStore;
