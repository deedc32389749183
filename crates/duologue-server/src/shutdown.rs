//! Graceful shutdown signalling via `CancellationToken`.
//!
//! Connection loops watch child tokens; cancelling the root unblocks every
//! read loop, the sockets close, and axum's graceful shutdown then waits for
//! the in-flight handlers to finish.

use tokio_util::sync::CancellationToken;

/// Fans the shutdown signal out to server tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the cancellation token for tasks to watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown to every watcher.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
