//! Window sizes expressed as an amount of a time unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TurnstileError};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Time unit for limiter windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Nanosecond => Duration::from_nanos(1),
            TimeUnit::Microsecond => Duration::from_micros(1),
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Nanosecond => "ns",
            TimeUnit::Microsecond => "us",
            TimeUnit::Millisecond => "ms",
            TimeUnit::Second => "s",
            TimeUnit::Minute => "m",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
        }
    }
}

/// A window length given as `amount × unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    /// Number of units in the window (must be > 0)
    #[serde(default = "default_amount")]
    pub amount: u64,
    /// The time unit
    pub unit: TimeUnit,
}

fn default_amount() -> u64 {
    1
}

impl WindowSize {
    pub fn new(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    /// A window of exactly one unit.
    pub fn per(unit: TimeUnit) -> Self {
        Self::new(1, unit)
    }

    /// Convert to a duration, rejecting zero and overflowing amounts.
    pub fn to_duration(&self) -> Result<Duration> {
        if self.amount == 0 {
            return Err(TurnstileError::Config(
                "window amount must be greater than 0".to_string(),
            ));
        }
        let overflow = || TurnstileError::Config(format!("window {} overflows a duration", self));
        let nanos = self
            .unit
            .duration()
            .as_nanos()
            .checked_mul(u128::from(self.amount))
            .ok_or_else(overflow)?;
        let secs = u64::try_from(nanos / NANOS_PER_SEC).map_err(|_| overflow())?;
        // Remainder of a division by 10^9 always fits.
        let subsec = (nanos % NANOS_PER_SEC) as u32;
        Ok(Duration::new(secs, subsec))
    }

    /// Parse a compact form such as `250ms`, `2s`, `1m`, `3h`, `1d`, `500us`, `10ns`.
    ///
    /// A bare number is read as seconds.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|e| TurnstileError::Config(format!("invalid window '{}': {}", s, e)))?;
        let unit = match suffix.trim() {
            "ns" => TimeUnit::Nanosecond,
            "us" => TimeUnit::Microsecond,
            "ms" => TimeUnit::Millisecond,
            "" | "s" => TimeUnit::Second,
            "m" => TimeUnit::Minute,
            "h" => TimeUnit::Hour,
            "d" => TimeUnit::Day,
            other => {
                return Err(TurnstileError::Config(format!(
                    "unknown window unit '{}' in '{}'",
                    other, s
                )))
            }
        };
        Ok(Self::new(amount, unit))
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::per(TimeUnit::Second)
    }
}

impl FromStr for WindowSize {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Millisecond.duration(), Duration::from_millis(1));
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_window_to_duration() {
        let window = WindowSize::new(250, TimeUnit::Millisecond);
        assert_eq!(window.to_duration().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_amount_is_config_error() {
        let err = WindowSize::new(0, TimeUnit::Second).to_duration().unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_overflowing_amount_is_config_error() {
        let err = WindowSize::new(u64::MAX, TimeUnit::Day).to_duration().unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_large_amount_of_small_unit_converts() {
        let window = WindowSize::new(5_000_000_000, TimeUnit::Nanosecond);
        assert_eq!(window.to_duration().unwrap(), Duration::from_secs(5));

        let window = WindowSize::new(u64::MAX, TimeUnit::Nanosecond);
        assert_eq!(window.to_duration().unwrap(), Duration::from_nanos(u64::MAX));

        let window = WindowSize::parse("5000000000ns").unwrap();
        assert_eq!(window.to_duration().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_compact_forms() {
        assert_eq!(
            WindowSize::parse("250ms").unwrap(),
            WindowSize::new(250, TimeUnit::Millisecond)
        );
        assert_eq!(WindowSize::parse("2s").unwrap(), WindowSize::new(2, TimeUnit::Second));
        assert_eq!(WindowSize::parse("1m").unwrap(), WindowSize::per(TimeUnit::Minute));
        assert_eq!(WindowSize::parse("30").unwrap(), WindowSize::new(30, TimeUnit::Second));
        assert!(WindowSize::parse("5 fortnights").is_err());
        assert!(WindowSize::parse("ms").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let window = WindowSize::new(500, TimeUnit::Microsecond);
        assert_eq!(window.to_string(), "500us");
        assert_eq!(WindowSize::parse(&window.to_string()).unwrap(), window);
    }

    #[test]
    fn test_deserialize_lowercase_unit() {
        let window: WindowSize = serde_yaml::from_str("{ amount: 3, unit: minute }").unwrap();
        assert_eq!(window, WindowSize::new(3, TimeUnit::Minute));

        let window: WindowSize = serde_yaml::from_str("unit: hour").unwrap();
        assert_eq!(window, WindowSize::per(TimeUnit::Hour));
    }
}
