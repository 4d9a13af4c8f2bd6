//! Strategy selection: one limiter type backed by either algorithm.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::backend::RequestLimiter;
use super::cancel::CancelToken;
use super::clock::MonotonicClock;
use super::fixed::FixedWindowLimiter;
use super::sliding::SlidingWindowLimiter;
use crate::config::LimiterConfig;
use crate::error::{Result, TurnstileError};

/// Admission algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// At most `capacity` admissions in any trailing window
    #[default]
    Sliding,
    /// At most `capacity` admissions per lazily rolled window segment
    Fixed,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sliding => write!(f, "sliding"),
            Strategy::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for Strategy {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sliding" => Ok(Strategy::Sliding),
            "fixed" => Ok(Strategy::Fixed),
            other => Err(TurnstileError::Config(format!(
                "unknown strategy '{}' (expected 'sliding' or 'fixed')",
                other
            ))),
        }
    }
}

/// A limiter whose strategy is chosen at construction.
pub enum Limiter {
    Sliding(SlidingWindowLimiter<MonotonicClock>),
    Fixed(FixedWindowLimiter<MonotonicClock>),
}

impl Limiter {
    pub fn new(strategy: Strategy, window: Duration, capacity: usize, fair: bool) -> Result<Self> {
        Ok(match strategy {
            Strategy::Sliding => Limiter::Sliding(SlidingWindowLimiter::with_options(
                window,
                capacity,
                MonotonicClock,
                fair,
            )?),
            Strategy::Fixed => Limiter::Fixed(FixedWindowLimiter::with_options(
                window,
                capacity,
                MonotonicClock,
                fair,
            )?),
        })
    }

    /// Build the limiter described by a configuration section.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let window = config.window.to_duration()?;
        Self::new(config.strategy, window, config.capacity, config.fair)
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Limiter::Sliding(_) => Strategy::Sliding,
            Limiter::Fixed(_) => Strategy::Fixed,
        }
    }

    fn inner(&self) -> &dyn RequestLimiter {
        match self {
            Limiter::Sliding(limiter) => limiter,
            Limiter::Fixed(limiter) => limiter,
        }
    }
}

impl RequestLimiter for Limiter {
    fn acquire(&self) {
        self.inner().acquire()
    }

    fn acquire_cancellable(&self, token: &CancelToken) -> Result<()> {
        self.inner().acquire_cancellable(token)
    }

    fn try_acquire(&self) -> bool {
        self.inner().try_acquire()
    }

    fn available(&self) -> usize {
        self.inner().available()
    }

    fn capacity(&self) -> usize {
        self.inner().capacity()
    }

    fn window(&self) -> Duration {
        self.inner().window()
    }
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limiter")
            .field("strategy", &self.strategy())
            .field("capacity", &self.capacity())
            .field("window", &self.window())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::window::{TimeUnit, WindowSize};

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("sliding".parse::<Strategy>().unwrap(), Strategy::Sliding);
        assert_eq!("FIXED".parse::<Strategy>().unwrap(), Strategy::Fixed);
        assert!("token-bucket".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_from_config_selects_strategy() {
        let config = LimiterConfig {
            strategy: Strategy::Fixed,
            capacity: 7,
            window: WindowSize::new(250, TimeUnit::Millisecond),
            fair: false,
        };
        let limiter = Limiter::from_config(&config).unwrap();

        assert_eq!(limiter.strategy(), Strategy::Fixed);
        assert_eq!(limiter.capacity(), 7);
        assert_eq!(limiter.window(), Duration::from_millis(250));
        assert_eq!(limiter.available(), 7);
    }

    #[test]
    fn test_from_config_rejects_invalid_values() {
        let config = LimiterConfig {
            capacity: 0,
            ..LimiterConfig::default()
        };
        assert!(matches!(
            Limiter::from_config(&config),
            Err(TurnstileError::Config(_))
        ));

        let config = LimiterConfig {
            window: WindowSize::new(0, TimeUnit::Second),
            ..LimiterConfig::default()
        };
        assert!(matches!(
            Limiter::from_config(&config),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_strategies_are_interchangeable() {
        fn drain(limiter: &dyn RequestLimiter) -> usize {
            let mut admitted = 0;
            while limiter.try_acquire() {
                admitted += 1;
            }
            admitted
        }

        for strategy in [Strategy::Sliding, Strategy::Fixed] {
            let limiter = Limiter::new(strategy, Duration::from_secs(10), 3, true).unwrap();
            assert_eq!(drain(&limiter), 3, "strategy {}", strategy);
        }
    }
}
