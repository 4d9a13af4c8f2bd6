//! Fixed window limiter with lazy rollover.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::{validate, RequestLimiter};
use super::cancel::CancelToken;
use super::clock::{Clock, MonotonicClock};
use super::monitor::{Monitor, Waiter};
use crate::error::Result;

/// Blocking limiter admitting at most `capacity` calls per fixed window segment.
///
/// Permits live in an atomic pool that callers drain without locking. When
/// the pool is empty a caller takes the lock and, if the current window has
/// elapsed, starts a new one at the current instant and refills the pool.
/// Rollover only ever happens inside a caller; there is no timer.
///
/// Because the window restarts whenever the first caller notices it has
/// elapsed, up to `2 × capacity` admissions can land within less than one
/// `window` around a rollover: a full pool drained at the end of one window,
/// then a full pool drained at the start of the next.
pub struct FixedWindowLimiter<C: Clock = MonotonicClock> {
    window: Duration,
    capacity: usize,
    clock: C,
    permits: AtomicUsize,
    monitor: Arc<Monitor<FixedState>>,
}

struct FixedState {
    window_start: Instant,
}

impl FixedWindowLimiter<MonotonicClock> {
    /// Create a limiter on the process monotonic clock with fair lock hand-off.
    ///
    /// The first window starts now. Fails with a configuration error when
    /// `capacity` is zero or `window` is empty.
    pub fn new(window: Duration, capacity: usize) -> Result<Self> {
        Self::with_clock(window, capacity, MonotonicClock)
    }
}

impl<C: Clock> FixedWindowLimiter<C> {
    pub fn with_clock(window: Duration, capacity: usize, clock: C) -> Result<Self> {
        Self::with_options(window, capacity, clock, true)
    }

    /// Create a limiter; `fair` releases the lock to the longest waiter first.
    pub fn with_options(window: Duration, capacity: usize, clock: C, fair: bool) -> Result<Self> {
        validate(window, capacity)?;
        debug!(?window, capacity, fair, "Creating fixed window limiter");

        let window_start = clock.now();
        Ok(Self {
            window,
            capacity,
            clock,
            permits: AtomicUsize::new(capacity),
            monitor: Monitor::new(FixedState { window_start }, fair),
        })
    }

    /// Start of the current window, as last observed by a caller.
    pub fn window_start(&self) -> Instant {
        self.monitor.lock().window_start
    }

    /// Take one permit if any are left. Never blocks.
    fn try_take(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        while current > 0 {
            match self.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Start a new window at `now` if the current one has elapsed. Lock must be held.
    fn roll_over_if_elapsed(&self, state: &mut FixedState, now: Instant) {
        if now.saturating_duration_since(state.window_start) < self.window {
            return;
        }
        state.window_start = now;
        self.permits.store(self.capacity, Ordering::Release);
        self.monitor.notify_all();
        trace!(capacity = self.capacity, "Window rolled over");
    }

    fn acquire_with(&self, waiter: &mut Waiter<'_>) -> Result<()> {
        if self.try_take() {
            trace!("Admitted on fast path");
            return Ok(());
        }

        let mut state = self.monitor.lock();
        loop {
            let now = self.clock.now();
            self.roll_over_if_elapsed(&mut state, now);

            if self.try_take() {
                trace!("Admitted after waiting");
                self.monitor.release(state);
                return Ok(());
            }

            let timeout = state
                .window_start
                .checked_add(self.window)
                .map_or(Duration::MAX, |end| end.saturating_duration_since(now));
            debug!(?timeout, "Permits exhausted, waiting for next window");
            if let Err(e) = self.monitor.wait_for(&mut state, timeout, waiter) {
                self.monitor.release(state);
                return Err(e);
            }
        }
    }
}

impl<C: Clock> RequestLimiter for FixedWindowLimiter<C> {
    fn acquire(&self) {
        let mut waiter = Waiter::uncancellable();
        // Only a cancellation token can make the wait fail.
        let _ = self.acquire_with(&mut waiter);
    }

    fn acquire_cancellable(&self, token: &CancelToken) -> Result<()> {
        let mut waiter = Waiter::with_token(token);
        self.acquire_with(&mut waiter)
    }

    fn try_acquire(&self) -> bool {
        if self.try_take() {
            return true;
        }
        let mut state = self.monitor.lock();
        let now = self.clock.now();
        self.roll_over_if_elapsed(&mut state, now);
        let admitted = self.try_take();
        self.monitor.release(state);
        admitted
    }

    fn available(&self) -> usize {
        let state = self.monitor.lock();
        let now = self.clock.now();
        if now.saturating_duration_since(state.window_start) >= self.window {
            self.capacity
        } else {
            let permits = self.permits.load(Ordering::Acquire);
            assert!(
                permits <= self.capacity,
                "fixed window holds {} permits with capacity {}",
                permits,
                self.capacity
            );
            permits
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn window(&self) -> Duration {
        self.window
    }
}
