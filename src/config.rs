//! Configuration management for windowlimit.
//!
//! Rule sets are loaded from YAML:
//!
//! ```yaml
//! rules:
//!   - window_ms: 1000
//!     max_points: 5
//!     name: burst
//!   - unit: hour
//!     max_points: 1000
//! trim:
//!   interval_ms: 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{RateRule, TimeUnit};

/// Main configuration for a limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Rules every identifier must satisfy
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Background trimming
    #[serde(default)]
    pub trim: TrimConfig,
}

/// One rule as written in configuration.
///
/// Exactly one of `window_ms` and `unit` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Window length in milliseconds
    #[serde(default)]
    pub window_ms: Option<i64>,
    /// Window length as a whole time unit
    #[serde(default)]
    pub unit: Option<TimeUnit>,
    /// Point budget for one window
    pub max_points: f64,
    /// Optional label for logging
    #[serde(default)]
    pub name: Option<String>,
}

/// Periodic trim configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrimConfig {
    /// Interval between trim passes; when unset only `check` trims
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

impl TrimConfig {
    /// The trim interval, if periodic trimming is enabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }
}

impl RuleConfig {
    /// Validate and convert into a [`RateRule`].
    pub fn to_rule(&self) -> Result<RateRule> {
        let rule = match (self.window_ms, self.unit) {
            (Some(window_ms), None) => RateRule::new(window_ms, self.max_points)?,
            (None, Some(unit)) => RateRule::per(unit, self.max_points)?,
            (Some(_), Some(_)) => {
                return Err(LimiterError::Parse(
                    "rule sets both window_ms and unit".to_string(),
                ))
            }
            (None, None) => {
                return Err(LimiterError::Parse(
                    "rule needs either window_ms or unit".to_string(),
                ))
            }
        };

        Ok(match &self.name {
            Some(name) => rule.with_name(name.clone()),
            None => rule,
        })
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Parse(format!("Failed to parse limiter config: {}", e)))
    }

    /// Validate every configured rule, in order.
    pub fn build_rules(&self) -> Result<Vec<RateRule>> {
        self.rules.iter().map(RuleConfig::to_rule).collect()
    }
}
