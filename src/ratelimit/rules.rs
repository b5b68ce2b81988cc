//! Rate limit rules.
//!
//! A rule is a trailing time window paired with the maximum number of points
//! an identifier may accumulate inside that window. Rules are validated once,
//! at construction, and are immutable afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{LimiterError, Result};

/// Whole time units accepted by [`RateRule::per`] and the YAML configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// A single window/budget constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRule {
    window: Duration,
    max_points: f64,
    name: Option<String>,
}

impl RateRule {
    /// Create a rule allowing `max_points` within a trailing window of
    /// `window_ms` milliseconds.
    ///
    /// Fails with [`LimiterError::Config`] naming the offending field when
    /// either value is negative. `max_points` must also not be NaN.
    pub fn new(window_ms: i64, max_points: f64) -> Result<Self> {
        if window_ms < 0 {
            return Err(LimiterError::Config {
                field: "window_ms",
                value: window_ms as f64,
            });
        }
        if max_points.is_nan() || max_points < 0.0 {
            return Err(LimiterError::Config {
                field: "max_points",
                value: max_points,
            });
        }

        Ok(Self {
            window: Duration::from_millis(window_ms as u64),
            max_points,
            name: None,
        })
    }

    /// Create a rule spanning one whole time unit.
    pub fn per(unit: TimeUnit, max_points: f64) -> Result<Self> {
        Self::new(unit.duration().as_millis() as i64, max_points)
    }

    /// Attach a label used when logging denials.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The trailing window this rule sums over.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The point budget for one window.
    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    /// Optional label.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether `points` accumulated in the window breaks this rule.
    pub fn is_exceeded_by(&self, points: f64) -> bool {
        points > self.max_points
    }
}

impl fmt::Display for RateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(
                f,
                "{}({}pts/{}ms)",
                name,
                self.max_points,
                self.window.as_millis()
            ),
            None => write!(f, "{}pts/{}ms", self.max_points, self.window.as_millis()),
        }
    }
}

/// Widest window across a rule set, zero when the set is empty.
pub(crate) fn max_window(rules: &[RateRule]) -> Duration {
    rules
        .iter()
        .map(RateRule::window)
        .max()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_valid_rule() {
        let rule = assert_ok!(RateRule::new(1000, 5.0));
        assert_eq!(rule.window(), Duration::from_millis(1000));
        assert_eq!(rule.max_points(), 5.0);
        assert!(rule.name().is_none());
    }

    #[test]
    fn test_zero_values_are_valid() {
        let rule = assert_ok!(RateRule::new(0, 0.0));
        assert_eq!(rule.window(), Duration::ZERO);
        assert_eq!(rule.max_points(), 0.0);
    }

    #[test]
    fn test_negative_window_rejected() {
        let err = assert_err!(RateRule::new(-1, 5.0));
        match err {
            LimiterError::Config { field, value } => {
                assert_eq!(field, "window_ms");
                assert_eq!(value, -1.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_points_rejected() {
        let err = assert_err!(RateRule::new(1000, -1.0));
        assert!(matches!(
            err,
            LimiterError::Config {
                field: "max_points",
                ..
            }
        ));
    }

    #[test]
    fn test_nan_points_rejected() {
        assert_err!(RateRule::new(1000, f64::NAN));
    }

    #[test]
    fn test_window_checked_before_points() {
        let err = assert_err!(RateRule::new(-5, -5.0));
        assert!(matches!(err, LimiterError::Config { field: "window_ms", .. }));
    }

    #[test]
    fn test_error_message_names_field() {
        let err = RateRule::new(1000, -2.5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: max_points must be non-negative, got -2.5"
        );
    }

    #[test]
    fn test_per_unit() {
        let rule = RateRule::per(TimeUnit::Minute, 100.0).unwrap();
        assert_eq!(rule.window(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_exceeded_is_strict() {
        let rule = RateRule::new(1000, 5.0).unwrap();
        assert!(!rule.is_exceeded_by(5.0));
        assert!(rule.is_exceeded_by(5.5));
    }

    #[test]
    fn test_display() {
        let rule = RateRule::new(1000, 5.0).unwrap();
        assert_eq!(rule.to_string(), "5pts/1000ms");
        let rule = rule.with_name("burst");
        assert_eq!(rule.to_string(), "burst(5pts/1000ms)");
    }

    #[test]
    fn test_max_window() {
        assert_eq!(max_window(&[]), Duration::ZERO);
        let rules = vec![
            RateRule::new(1000, 5.0).unwrap(),
            RateRule::new(60_000, 100.0).unwrap(),
            RateRule::new(500, 2.0).unwrap(),
        ];
        assert_eq!(max_window(&rules), Duration::from_secs(60));
    }
}
