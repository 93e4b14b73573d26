//! Cooperative cancellation.
//!
//! A [`CancelToken`] is owned by a request and shared by reference with
//! every long-running operation spawned for it. Cancellation is one-shot
//! and cooperative: loop and tool code polls the flag at safe points and
//! unwinds cleanly; nothing is forcibly killed.

use tokio_util::sync::CancellationToken;

/// Cooperative, one-shot cancellation flag with an awaitable signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// Create a fresh token.
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn request_cancel(&self) {
        self.inner.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Raw handle for provider abort options.
    pub fn handle(&self) -> CancellationToken {
        self.inner.clone()
    }
}
