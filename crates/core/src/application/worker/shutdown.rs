// Shutdown Token
// Cooperative cancellation shared by the caller, the queue and its loops

use tokio_util::sync::CancellationToken;

/// Shutdown signal for graceful termination
///
/// Cloning shares the same signal. A child token fires when its parent does
/// but can also be fired on its own.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    token: CancellationToken,
}

impl ShutdownToken {
    /// A token that only fires through a [`ShutdownSender`] or a parent
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for shutdown signal
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Derive a token that also fires when `self` does
    pub fn child(&self) -> ShutdownToken {
        Self {
            token: self.token.child_token(),
        }
    }
}

impl From<CancellationToken> for ShutdownToken {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    token: CancellationToken,
}

impl ShutdownSender {
    /// Signal shutdown to every holder of the paired token
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let token = CancellationToken::new();
    (
        ShutdownSender {
            token: token.clone(),
        },
        ShutdownToken { token },
    )
}
