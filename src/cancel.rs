//! One-way cancellation token.
//!
//! Once signaled a token never returns to the armed state; engines create a
//! fresh token for each run cycle. This is the only state in the crate that
//! is mutated from more than one execution context.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// A new token in the armed state.
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is signaled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}
