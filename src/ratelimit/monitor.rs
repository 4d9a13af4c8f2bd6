//! Mutex + condition variable monitor shared by the limiter strategies.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::cancel::{CancelToken, Registration, Wake};
use crate::error::{Result, TurnstileError};

/// Limiter state behind a lock, plus the condition its waiters park on.
///
/// Parking lot condition variables queue waiters in arrival order, and with
/// `fair` set every release hands the lock straight to the longest-waiting
/// thread, so a caller blocked for a long time is not overtaken indefinitely.
pub(crate) struct Monitor<S> {
    state: Mutex<S>,
    cond: Condvar,
    fair: bool,
}

impl<S: Send + 'static> Monitor<S> {
    pub(crate) fn new(state: S, fair: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
            fair,
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock()
    }

    /// Release the lock, fairly if configured.
    pub(crate) fn release(&self, guard: MutexGuard<'_, S>) {
        if self.fair {
            MutexGuard::unlock_fair(guard);
        } else {
            drop(guard);
        }
    }

    /// Wake waiters for `freed` newly available slots: one for one, all for
    /// several, nobody for none.
    pub(crate) fn notify_freed(&self, freed: usize) {
        match freed {
            0 => {}
            1 => {
                self.cond.notify_one();
            }
            _ => {
                let woken = self.cond.notify_all();
                trace!(freed, woken, "Woke all waiters");
            }
        }
    }

    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Block for at most `timeout`, releasing the lock meanwhile.
    ///
    /// Returns `Ok(true)` when the full timeout elapsed and `Ok(false)` on an
    /// early wake. Fails with [`TurnstileError::Cancelled`] when the waiter's
    /// token is cancelled before or during the wait; the caller must not have
    /// recorded anything yet.
    pub(crate) fn wait_for<'t>(
        self: &Arc<Self>,
        guard: &mut MutexGuard<'_, S>,
        timeout: Duration,
        waiter: &mut Waiter<'t>,
    ) -> Result<bool> {
        if let Some(token) = waiter.token {
            if waiter.registration.is_none() {
                let waker: Arc<dyn Wake> = self.clone();
                waiter.registration = Some(token.register(waker));
            }
            if token.is_cancelled() {
                return Err(self.cancelled());
            }
        }

        if timeout.is_zero() {
            return Ok(true);
        }

        let timed_out = self.cond.wait_for(guard, timeout).timed_out();

        if waiter.token.map_or(false, CancelToken::is_cancelled) {
            return Err(self.cancelled());
        }
        Ok(timed_out)
    }

    fn cancelled(&self) -> TurnstileError {
        debug!("Waiter cancelled, leaving limiter state untouched");
        // We may have consumed a wakeup meant for a slot we will not take.
        self.cond.notify_one();
        TurnstileError::Cancelled
    }
}

impl<S: Send> Wake for Monitor<S> {
    fn wake(&self) {
        // Taking the lock orders this notify after any waiter that checked the
        // token under the lock and then parked.
        let _guard = self.state.lock();
        self.cond.notify_all();
    }
}

/// Per-call waiting context: the optional cancellation token and its registration.
pub(crate) struct Waiter<'t> {
    token: Option<&'t CancelToken>,
    registration: Option<Registration<'t>>,
}

impl<'t> Waiter<'t> {
    pub(crate) fn uncancellable() -> Self {
        Self {
            token: None,
            registration: None,
        }
    }

    pub(crate) fn with_token(token: &'t CancelToken) -> Self {
        Self {
            token: Some(token),
            registration: None,
        }
    }
}
