// streamq Infrastructure - In-Memory Adapter
// Implements: StreamStore (append-only streams with consumer groups)

mod stream;
mod stream_store;

pub use stream::TRIM_CHUNK;
pub use stream_store::MemoryStreamStore;
