//! Load driver: many caller threads contending for one limiter.

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::ratelimit::{CancelToken, RequestLimiter};

/// Maximum number of offsets falling in any half-open span `[t, t + window)`.
pub fn peak_admissions(offsets: &[Duration], window: Duration) -> usize {
    if window.is_zero() {
        return 0;
    }
    let mut sorted = offsets.to_vec();
    sorted.sort_unstable();

    let mut peak = 0;
    let mut lo = 0;
    for hi in 0..sorted.len() {
        while sorted[hi] - sorted[lo] >= window {
            lo += 1;
        }
        peak = peak.max(hi - lo + 1);
    }
    peak
}

/// Outcome of one driver run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub capacity: usize,
    pub window_ms: f64,
    pub callers: usize,
    pub attempted: usize,
    pub admitted: usize,
    pub cancelled: usize,
    pub elapsed_ms: f64,
    /// Most admissions observed in any trailing window
    pub peak_in_window: usize,
    /// Admission offsets from the start of the run, sorted
    pub admissions_ms: Vec<f64>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "capacity {} per {:.1}ms, {} callers",
            self.capacity, self.window_ms, self.callers
        )?;
        writeln!(
            f,
            "admitted {}/{} ({} cancelled) in {:.1}ms",
            self.admitted, self.attempted, self.cancelled, self.elapsed_ms
        )?;
        write!(f, "peak admissions in any window: {}", self.peak_in_window)
    }
}

/// Runs a fixed amount of load through a limiter on plain threads.
pub struct Driver<L> {
    limiter: L,
    config: DriverConfig,
    cancel: CancelToken,
}

impl<L: RequestLimiter> Driver<L> {
    pub fn new(limiter: L, config: DriverConfig, cancel: CancelToken) -> Self {
        Self {
            limiter,
            config,
            cancel,
        }
    }

    /// Start every caller at once and wait for all of them.
    ///
    /// Cancelling the driver's token stops callers that are waiting and keeps
    /// the rest from starting new acquisitions; those count as cancelled.
    pub fn run(&self) -> Report {
        let callers = self.config.callers;
        let per_caller = self.config.acquisitions_per_caller;
        let attempted = callers.saturating_mul(per_caller);
        let admissions = Mutex::new(Vec::new());
        let cancelled = Mutex::new(0usize);

        info!(
            callers,
            per_caller,
            capacity = self.limiter.capacity(),
            window = ?self.limiter.window(),
            "Starting load"
        );

        let origin = Instant::now();
        thread::scope(|scope| {
            for caller in 0..callers {
                let admissions = &admissions;
                let cancelled = &cancelled;
                scope.spawn(move || {
                    for done in 0..per_caller {
                        if self.cancel.is_cancelled() {
                            *cancelled.lock() += per_caller - done;
                            break;
                        }
                        if self.limiter.acquire_cancellable(&self.cancel).is_err() {
                            debug!(caller, "Caller cancelled while waiting");
                            *cancelled.lock() += per_caller - done;
                            break;
                        }
                        admissions.lock().push(origin.elapsed());
                        self.work();
                    }
                });
            }
        });
        let elapsed = origin.elapsed();

        let mut admissions = admissions.into_inner();
        admissions.sort_unstable();
        let window = self.limiter.window();

        let report = Report {
            capacity: self.limiter.capacity(),
            window_ms: as_ms(window),
            callers,
            attempted,
            admitted: admissions.len(),
            cancelled: cancelled.into_inner(),
            elapsed_ms: as_ms(elapsed),
            peak_in_window: peak_admissions(&admissions, window),
            admissions_ms: admissions.iter().copied().map(as_ms).collect(),
        };
        info!(
            admitted = report.admitted,
            cancelled = report.cancelled,
            peak = report.peak_in_window,
            "Load finished"
        );
        report
    }

    fn work(&self) {
        let mut millis = self.config.work_ms;
        if self.config.jitter_ms > 0 {
            millis += rand::thread_rng().gen_range(0..=self.config.jitter_ms);
        }
        if millis > 0 {
            thread::sleep(Duration::from_millis(millis));
        }
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{FixedWindowLimiter, SlidingWindowLimiter};
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_peak_admissions_empty() {
        assert_eq!(peak_admissions(&[], ms(100)), 0);
    }

    #[test]
    fn test_peak_admissions_is_half_open() {
        let offsets = [ms(0), ms(50), ms(100), ms(150)];
        // [0, 100) holds 0 and 50; 100 starts the next span.
        assert_eq!(peak_admissions(&offsets, ms(100)), 2);
        assert_eq!(peak_admissions(&offsets, ms(101)), 3);
    }

    #[test]
    fn test_peak_admissions_unsorted_input() {
        let offsets = [ms(300), ms(10), ms(320), ms(20), ms(310)];
        assert_eq!(peak_admissions(&offsets, ms(100)), 3);
    }

    #[test]
    fn test_sliding_run_respects_capacity() {
        let limiter = SlidingWindowLimiter::new(ms(100), 3).unwrap();
        let config = DriverConfig {
            callers: 6,
            acquisitions_per_caller: 1,
            work_ms: 0,
            jitter_ms: 0,
        };
        let report = Driver::new(&limiter, config, CancelToken::new()).run();

        assert_eq!(report.attempted, 6);
        assert_eq!(report.admitted, 6);
        assert_eq!(report.cancelled, 0);
        assert!(report.peak_in_window <= 3);
        assert!(report.elapsed_ms >= 80.0, "elapsed {}ms", report.elapsed_ms);
    }

    #[test]
    fn test_cancelled_run_reports_cancelled_callers() {
        let limiter = Arc::new(FixedWindowLimiter::new(Duration::from_secs(30), 2).unwrap());
        let cancel = CancelToken::new();
        let config = DriverConfig {
            callers: 5,
            acquisitions_per_caller: 1,
            work_ms: 0,
            jitter_ms: 0,
        };
        let driver = Driver::new(limiter, config, cancel.clone());

        let canceller = thread::spawn(move || {
            thread::sleep(ms(80));
            cancel.cancel();
        });
        let start = Instant::now();
        let report = driver.run();
        canceller.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(report.admitted, 2);
        assert_eq!(report.cancelled, 3);
        assert_eq!(report.admissions_ms.len(), 2);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let limiter = SlidingWindowLimiter::new(ms(50), 2).unwrap();
        let config = DriverConfig {
            callers: 2,
            acquisitions_per_caller: 1,
            work_ms: 1,
            jitter_ms: 2,
        };
        let report = Driver::new(&limiter, config, CancelToken::new()).run();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["admitted"], 2);
        assert_eq!(json["capacity"], 2);
        assert!(json["admissions_ms"].is_array());
    }
}
