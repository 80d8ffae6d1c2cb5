//! Cancellation handles for in-flight requests.
//!
//! A [`CancellationHandle`] owns the cancelling side of one request. The token
//! it hands out is attached to the request; cancelling the handle makes the
//! HTTP client reject that request with an error its `is_cancel` recognises.
//!
//! `cancel` consumes the handle, so a handle can fire at most once.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback run when a handle is cancelled.
pub type CancelHook = Arc<dyn Fn() + Send + Sync>;

/// Owner of the cancellation side of one request.
pub struct CancellationHandle {
    token: CancellationToken,
    on_cancel: Option<CancelHook>,
}

impl CancellationHandle {
    /// Handle over a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Handle over an existing token.
    #[must_use]
    pub const fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            on_cancel: None,
        }
    }

    /// Run `hook` when the handle is cancelled.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(hook));
        self
    }

    /// Token to attach to the request.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the request this handle belongs to.
    pub fn cancel(self) {
        self.token.cancel();
        if let Some(hook) = self.on_cancel {
            hook();
        }
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.token.is_cancelled())
            .field("hooked", &self.on_cancel.is_some())
            .finish()
    }
}
