//! Sliding-window rate limiting and record management.

mod clock;
mod limiter;
mod record;
mod rules;
mod trimmer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use record::{LogEntry, Record};
pub use rules::{RateRule, TimeUnit};
pub use trimmer::{spawn_trimmer, TrimmerHandle};
