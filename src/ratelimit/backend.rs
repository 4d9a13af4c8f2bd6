//! The contract shared by every limiter strategy.

use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancelToken;
use crate::error::{Result, TurnstileError};

/// A blocking rate limiter.
///
/// Callers acquire a slot before doing their own work; the limiter has no
/// knowledge of what follows admission. Strategies are interchangeable behind
/// this trait.
pub trait RequestLimiter: Send + Sync {
    /// Block until a slot is available and record the admission.
    fn acquire(&self);

    /// Like [`acquire`](Self::acquire), but give up with
    /// [`TurnstileError::Cancelled`](crate::TurnstileError::Cancelled) if
    /// `token` is cancelled while waiting.
    ///
    /// The token is only consulted when the caller would have to wait. A
    /// cancelled call leaves no trace in the limiter.
    fn acquire_cancellable(&self, token: &CancelToken) -> Result<()>;

    /// Record an admission if one is possible right now, without waiting.
    fn try_acquire(&self) -> bool;

    /// Number of admissions that would succeed right now without waiting.
    fn available(&self) -> usize;

    /// Maximum admissions per window.
    fn capacity(&self) -> usize;

    /// Window length.
    fn window(&self) -> Duration;
}

impl<L: RequestLimiter + ?Sized> RequestLimiter for Arc<L> {
    fn acquire(&self) {
        (**self).acquire()
    }

    fn acquire_cancellable(&self, token: &CancelToken) -> Result<()> {
        (**self).acquire_cancellable(token)
    }

    fn try_acquire(&self) -> bool {
        (**self).try_acquire()
    }

    fn available(&self) -> usize {
        (**self).available()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn window(&self) -> Duration {
        (**self).window()
    }
}

impl<L: RequestLimiter + ?Sized> RequestLimiter for &L {
    fn acquire(&self) {
        (**self).acquire()
    }

    fn acquire_cancellable(&self, token: &CancelToken) -> Result<()> {
        (**self).acquire_cancellable(token)
    }

    fn try_acquire(&self) -> bool {
        (**self).try_acquire()
    }

    fn available(&self) -> usize {
        (**self).available()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn window(&self) -> Duration {
        (**self).window()
    }
}

/// Reject a zero capacity or an empty window.
pub(crate) fn validate(window: Duration, capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(TurnstileError::Config(
            "capacity must be greater than 0".to_string(),
        ));
    }
    if window.is_zero() {
        return Err(TurnstileError::Config(
            "window must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
