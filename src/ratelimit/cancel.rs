//! Cooperative cancellation for callers blocked in a limiter.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Something a cancelled token must wake so its waiters can observe the cancellation.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

/// A clonable cancellation flag shared between a caller and whoever may cancel it.
///
/// Cancelling wakes every thread currently blocked in
/// [`acquire_cancellable`](crate::RequestLimiter::acquire_cancellable) with a
/// clone of this token, on any limiter. Cancellation is permanent.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    waiters: Mutex<Waiters>,
}

#[derive(Default)]
struct Waiters {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn Wake>)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake all registered waiters.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        // Collect first: waking takes the limiter's lock, and a waiter may be
        // holding that lock while it registers with us.
        let wakers: Vec<Arc<dyn Wake>> = {
            let waiters = self.inner.waiters.lock();
            waiters.entries.iter().map(|(_, w)| Arc::clone(w)).collect()
        };

        debug!(waiters = wakers.len(), "Cancellation requested");

        for waker in wakers {
            waker.wake();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called on this token or a clone.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a waker for as long as the returned guard lives.
    pub(crate) fn register(&self, waker: Arc<dyn Wake>) -> Registration<'_> {
        let mut waiters = self.inner.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.entries.push((id, waker));
        Registration { token: self, id }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner.waiters.lock().entries.len()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Deregisters its waker from the token on drop.
pub(crate) struct Registration<'t> {
    token: &'t CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut waiters = self.token.inner.waiters.lock();
        waiters.entries.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_registered_waiters_once() {
        let token = CancelToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let _registration = token.register(waker.clone());
        token.cancel();
        token.cancel();

        assert_eq!(waker.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_is_not_woken() {
        let token = CancelToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        {
            let _registration = token.register(waker.clone());
            assert_eq!(token.registered(), 1);
        }
        assert_eq!(token.registered(), 0);

        token.cancel();
        assert_eq!(waker.0.load(Ordering::SeqCst), 0);
    }
}
