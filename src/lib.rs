//! Windowlimit - Multi-rule sliding-window rate limiting
//!
//! This crate tracks weighted points consumed per identifier and answers
//! whether an identifier is within every configured window/budget rule.
//! Expired history is reclaimed opportunistically from `check`, on demand via
//! `trim`, or by a periodic trimmer task.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{LimiterError, Result};
pub use ratelimit::{RateLimiter, RateRule};
