//! Core rate limiter implementation.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::record::Record;
use super::rules::{max_window, RateRule};
use crate::config::LimiterConfig;
use crate::error::Result;

/// A multi-rule sliding-window rate limiter.
///
/// Each identifier gets a [`Record`] of timestamped point entries. `check`
/// evaluates every rule against the record and `consume` appends to it.
/// Expired entries are reclaimed by `trim`, which `check` also runs on its own
/// once it has been called more times than there are tracked identifiers.
///
/// This struct is thread-safe and can be shared across threads behind an `Arc`.
/// A caller that only ever calls `consume` never triggers the opportunistic
/// trim, so it must call `trim` itself (or run a trimmer task) to bound memory.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Rules, in configuration order
    rules: Vec<RateRule>,
    /// Widest window across all rules
    max_window: Duration,
    /// Event logs indexed by identifier
    records: DashMap<String, Record>,
    /// Checks since the last trim pass
    trim_counter: AtomicUsize,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter driven by the system clock.
    pub fn new(rules: Vec<RateRule>) -> Self {
        Self::with_clock(rules, SystemClock::new())
    }

    /// Build a rule. Shorthand for [`RateRule::new`].
    pub fn rule(window_ms: i64, max_points: f64) -> Result<RateRule> {
        RateRule::new(window_ms, max_points)
    }

    /// Create a rate limiter from a loaded configuration.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        Ok(Self::new(config.build_rules()?))
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter that reads time from `clock`.
    pub fn with_clock(rules: Vec<RateRule>, clock: C) -> Self {
        let max_window = max_window(&rules);
        debug!(
            rules = rules.len(),
            max_window_ms = max_window.as_millis() as u64,
            "Creating rate limiter"
        );

        Self {
            rules,
            max_window,
            records: DashMap::new(),
            trim_counter: AtomicUsize::new(0),
            clock,
        }
    }

    /// Check whether `id` is currently within every rule.
    ///
    /// Returns `true` for identifiers that have never consumed. Every call
    /// counts towards the opportunistic trim, including calls for unknown
    /// identifiers.
    pub fn check(&self, id: &str) -> bool {
        self.maybe_trim();

        let Some(record) = self.records.get(id) else {
            trace!(id = %id, "No record, permitting");
            return true;
        };

        let now = self.clock.now();
        for rule in &self.rules {
            let points = record.windowed_sum(rule.window(), now);
            if rule.is_exceeded_by(points) {
                debug!(id = %id, rule = %rule, points = points, "Rate limit exceeded");
                return false;
            }
        }

        trace!(id = %id, "Within all rules");
        true
    }

    /// Record `points` consumed by `id` at the current instant.
    ///
    /// This never rejects; call [`check`](Self::check) first, or use
    /// [`try_consume`](Self::try_consume), to enforce the rules.
    pub fn consume(&self, id: &str, points: f64) -> &Self {
        let now = self.clock.now();

        trace!(id = %id, points = points, "Consuming points");

        if let Some(mut record) = self.records.get_mut(id) {
            record.append(points, now);
            return self;
        }

        self.records
            .entry(id.to_owned())
            .or_insert_with(|| {
                debug!(id = %id, "Creating new record");
                Record::new()
            })
            .append(points, now);
        self
    }

    /// Record a single point consumed by `id`.
    pub fn consume_one(&self, id: &str) -> &Self {
        self.consume(id, 1.0)
    }

    /// Consume `points` only if `id` currently passes [`check`](Self::check).
    ///
    /// Returns whether the points were recorded.
    pub fn try_consume(&self, id: &str, points: f64) -> bool {
        if !self.check(id) {
            return false;
        }
        self.consume(id, points);
        true
    }

    /// Evict expired entries and drop identifiers left with none.
    ///
    /// Returns the number of identifiers removed.
    pub fn trim(&self) -> usize {
        self.trim_counter.store(0, Ordering::Relaxed);

        let Some(cutoff) = self.expire_timestamp() else {
            return 0;
        };

        let mut evicted = 0;
        self.records.retain(|_, record| {
            let keep = !record.trim(cutoff);
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!(
                evicted = evicted,
                remaining = self.records.len(),
                "Trimmed expired records"
            );
        } else {
            trace!(remaining = self.records.len(), "Trim pass evicted nothing");
        }
        evicted
    }

    /// The instant at or before which entries no longer matter to any rule.
    ///
    /// Recomputed on every call. `None` when `now - max_window` cannot be
    /// represented, in which case nothing has expired yet.
    pub fn expire_timestamp(&self) -> Option<Instant> {
        self.clock.now().checked_sub(self.max_window)
    }

    /// Points `id` has consumed within the trailing `window`.
    ///
    /// Returns `None` if no record exists for `id`.
    pub fn points_in(&self, id: &str, window: Duration) -> Option<f64> {
        let now = self.clock.now();
        self.records
            .get(id)
            .map(|record| record.windowed_sum(window, now))
    }

    /// Whether a record is currently held for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Get the number of tracked identifiers.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The configured rules.
    pub fn rules(&self) -> &[RateRule] {
        &self.rules
    }

    /// The widest configured window.
    pub fn max_window(&self) -> Duration {
        self.max_window
    }

    /// The clock this limiter reads.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.records.clear();
        self.trim_counter.store(0, Ordering::Relaxed);
    }

    /// Run a trim pass once checks outnumber tracked identifiers.
    fn maybe_trim(&self) {
        let checks = self.trim_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if checks > self.records.len() {
            self.trim();
        }
    }
}
