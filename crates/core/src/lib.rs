// streamq Core - Domain Logic & Ports
// NO infrastructure dependencies (Hexagonal Architecture)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{shutdown_channel, Queue, ShutdownSender, ShutdownToken};
pub use domain::{ConsumerOptions, StreamMessage, StreamOptions};
pub use error::{QueueError, Result};
pub use port::{handler_fn, MessageHandler, StreamStore};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
