//! Sliding window limiter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::{validate, RequestLimiter};
use super::cancel::CancelToken;
use super::clock::{Clock, MonotonicClock};
use super::monitor::{Monitor, Waiter};
use crate::error::Result;

/// Blocking limiter admitting at most `capacity` calls in any trailing `window`.
///
/// Admission instants are kept oldest-first in a buffer that never grows past
/// `capacity`. A caller that finds it full waits until the oldest entry ages
/// out of the window (or until another caller's prune wakes it) and retries.
/// No background threads are involved: all pruning is done by callers.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use turnstile::{RequestLimiter, SlidingWindowLimiter};
///
/// let limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 2).unwrap();
/// limiter.acquire();
/// limiter.acquire();
/// assert!(!limiter.try_acquire());
/// ```
pub struct SlidingWindowLimiter<C: Clock = MonotonicClock> {
    window: Duration,
    capacity: usize,
    clock: C,
    monitor: Arc<Monitor<SlidingState>>,
}

/// Admission instants still inside the window, oldest first.
struct SlidingState {
    admitted: VecDeque<Instant>,
}

impl SlidingState {
    fn new(capacity: usize) -> Self {
        Self {
            admitted: VecDeque::with_capacity(capacity),
        }
    }

    /// Drop every admission at least `window` old. Returns how many were dropped.
    fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.admitted.pop_front();
            removed += 1;
        }
        removed
    }

    fn record(&mut self, now: Instant, capacity: usize) {
        assert!(
            self.admitted.len() < capacity,
            "sliding window holds {} admissions with capacity {}",
            self.admitted.len(),
            capacity
        );
        self.admitted.push_back(now);
    }

    fn len(&self) -> usize {
        self.admitted.len()
    }
}

impl SlidingWindowLimiter<MonotonicClock> {
    /// Create a limiter on the process monotonic clock with fair lock hand-off.
    ///
    /// Fails with a configuration error when `capacity` is zero or `window` is empty.
    pub fn new(window: Duration, capacity: usize) -> Result<Self> {
        Self::with_clock(window, capacity, MonotonicClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    pub fn with_clock(window: Duration, capacity: usize, clock: C) -> Result<Self> {
        Self::with_options(window, capacity, clock, true)
    }

    /// Create a limiter; `fair` releases the lock to the longest waiter first.
    pub fn with_options(window: Duration, capacity: usize, clock: C, fair: bool) -> Result<Self> {
        validate(window, capacity)?;
        debug!(?window, capacity, fair, "Creating sliding window limiter");

        Ok(Self {
            window,
            capacity,
            clock,
            monitor: Monitor::new(SlidingState::new(capacity), fair),
        })
    }

    fn acquire_with(&self, waiter: &mut Waiter<'_>) -> Result<()> {
        let mut state = self.monitor.lock();
        let mut now = self.clock.now();
        let mut freed = state.prune(now, self.window);

        while state.len() >= self.capacity {
            let Some(&oldest) = state.admitted.front() else {
                break;
            };
            // An unrepresentable deadline never arrives.
            let deadline = oldest.checked_add(self.window);
            let timeout = deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(now));
            debug!(?timeout, in_window = state.len(), "Window full, waiting for oldest admission to expire");

            match self.monitor.wait_for(&mut state, timeout, waiter) {
                Ok(timed_out) => {
                    now = self.clock.now();
                    if timed_out {
                        now = deadline.map_or(now, |d| now.max(d));
                    }
                    freed += state.prune(now, self.window);
                }
                Err(e) => {
                    // Slots freed by our prunes still belong to the other waiters.
                    self.monitor.notify_freed(freed);
                    self.monitor.release(state);
                    return Err(e);
                }
            }
        }

        state.record(now, self.capacity);
        trace!(in_window = state.len(), freed, "Admitted");
        self.monitor.notify_freed(freed);
        self.monitor.release(state);
        Ok(())
    }
}

impl<C: Clock> RequestLimiter for SlidingWindowLimiter<C> {
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
        let mut state = self.monitor.lock();
        let now = self.clock.now();
        let freed = state.prune(now, self.window);

        let admitted = state.len() < self.capacity;
        if admitted {
            state.record(now, self.capacity);
        }
        self.monitor.notify_freed(freed);
        self.monitor.release(state);
        admitted
    }

    fn available(&self) -> usize {
        let state = self.monitor.lock();
        let now = self.clock.now();
        let live = state
            .admitted
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count();
        self.capacity - live
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn window(&self) -> Duration {
        self.window
    }
}
