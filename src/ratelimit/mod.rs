//! Blocking admission control: the limiter contract and its strategies.

mod backend;
mod cancel;
mod clock;
mod fixed;
mod limiter;
mod monitor;
mod sliding;
mod window;

pub use backend::RequestLimiter;
pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use fixed::FixedWindowLimiter;
pub use limiter::{Limiter, Strategy};
pub use sliding::SlidingWindowLimiter;
pub use window::{TimeUnit, WindowSize};
