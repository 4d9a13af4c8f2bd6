//! Turnstile - Blocking Rate Limiting
//!
//! This crate implements in-process rate limiters that make excess callers
//! wait instead of failing. Two interchangeable strategies share one
//! contract: a sliding window with a strict bound over any trailing window,
//! and a fixed window with lazy rollover. Neither runs background threads;
//! callers coordinate through a mutex and condition variable.

pub mod config;
pub mod driver;
pub mod error;
pub mod ratelimit;

pub use error::{Result, TurnstileError};
pub use ratelimit::{
    CancelToken, Clock, FixedWindowLimiter, Limiter, ManualClock, MonotonicClock, RequestLimiter,
    SlidingWindowLimiter, Strategy, TimeUnit, WindowSize,
};
