//! # Bundle Configuration
//!
//! Threshold configuration for the bundling coordinator. Unlike most
//! configuration in the system, thresholds never fail validation: a
//! non-positive or unparseable value is replaced by its documented default and
//! surfaced as a [`ThresholdWarning`], so a misconfigured pipeline still runs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bundler_core::config::BundleConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // File first, then BUNDLER_* environment overrides
//! let config = BundleConfig::load(None)?;
//! let validated = config.threshold_policy();
//!
//! for warning in &validated.warnings {
//!     eprintln!("{warning}");
//! }
//! println!("max items per bundle: {}", validated.policy.max_items());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::{
    job_parameters, DEFAULT_MAX_BUNDLE_SIZE, DEFAULT_MAX_BUNDLE_TIME_MILLIS,
    MIN_BUNDLE_CHECK_PERIOD_MILLIS,
};

pub use error::{ConfigResult, ConfigurationError};

/// Raw bundle configuration as read from files, environment or job parameters.
///
/// Values are signed so that out-of-range settings survive deserialization and
/// can be reported instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Maximum number of items per bundle
    pub max_bundle_size: i64,
    /// Maximum bundle age in milliseconds
    pub max_bundle_time_millis: i64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_bundle_size: DEFAULT_MAX_BUNDLE_SIZE as i64,
            max_bundle_time_millis: DEFAULT_MAX_BUNDLE_TIME_MILLIS as i64,
        }
    }
}

impl BundleConfig {
    /// Validate into an effective threshold policy
    pub fn threshold_policy(&self) -> ValidatedThresholds {
        ThresholdPolicy::validate(self.max_bundle_size, self.max_bundle_time_millis)
    }
}

/// Effective bundle thresholds. Both limits are always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdPolicy {
    max_items: usize,
    max_age: Duration,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_BUNDLE_SIZE,
            max_age: Duration::from_millis(DEFAULT_MAX_BUNDLE_TIME_MILLIS),
        }
    }
}

impl ThresholdPolicy {
    /// Validate configured thresholds, substituting defaults for non-positive values
    pub fn validate(max_items: i64, max_age_millis: i64) -> ValidatedThresholds {
        let mut warnings = Vec::new();

        let effective_items = if max_items <= 0 {
            let warning = ThresholdWarning::MaxBundleSize {
                configured: max_items.to_string(),
                fallback: DEFAULT_MAX_BUNDLE_SIZE,
            };
            warn!(
                configured = max_items,
                fallback = DEFAULT_MAX_BUNDLE_SIZE,
                "Invalid value for the maximum bundle size, using default"
            );
            warnings.push(warning);
            DEFAULT_MAX_BUNDLE_SIZE
        } else {
            info!(
                max_bundle_size = max_items,
                "The maximum bundle size is configured"
            );
            max_items as usize
        };

        let effective_age_millis = if max_age_millis <= 0 {
            let warning = ThresholdWarning::MaxBundleTime {
                configured: max_age_millis.to_string(),
                fallback_millis: DEFAULT_MAX_BUNDLE_TIME_MILLIS,
            };
            warn!(
                configured = max_age_millis,
                fallback_millis = DEFAULT_MAX_BUNDLE_TIME_MILLIS,
                "Invalid value for the maximum bundle time, using default"
            );
            warnings.push(warning);
            DEFAULT_MAX_BUNDLE_TIME_MILLIS
        } else {
            info!(
                max_bundle_time_millis = max_age_millis,
                "The maximum bundle time is configured"
            );
            max_age_millis as u64
        };

        ValidatedThresholds {
            policy: Self {
                max_items: effective_items,
                max_age: Duration::from_millis(effective_age_millis),
            },
            warnings,
        }
    }

    /// Build thresholds from string-keyed job parameters.
    ///
    /// Missing keys use the defaults silently. Values that do not parse as
    /// integers are reported the same way as non-positive ones.
    pub fn from_job_parameters(parameters: &HashMap<String, String>) -> ValidatedThresholds {
        let mut parse_warnings = Vec::new();

        let max_items = match parameters.get(job_parameters::MAX_BUNDLE_SIZE) {
            None => DEFAULT_MAX_BUNDLE_SIZE as i64,
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(
                    key = job_parameters::MAX_BUNDLE_SIZE,
                    value = %raw,
                    fallback = DEFAULT_MAX_BUNDLE_SIZE,
                    "Unparseable maximum bundle size, using default"
                );
                parse_warnings.push(ThresholdWarning::MaxBundleSize {
                    configured: raw.clone(),
                    fallback: DEFAULT_MAX_BUNDLE_SIZE,
                });
                DEFAULT_MAX_BUNDLE_SIZE as i64
            }),
        };

        let max_age_millis = match parameters.get(job_parameters::MAX_BUNDLE_TIME_MILLIS) {
            None => DEFAULT_MAX_BUNDLE_TIME_MILLIS as i64,
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(
                    key = job_parameters::MAX_BUNDLE_TIME_MILLIS,
                    value = %raw,
                    fallback_millis = DEFAULT_MAX_BUNDLE_TIME_MILLIS,
                    "Unparseable maximum bundle time, using default"
                );
                parse_warnings.push(ThresholdWarning::MaxBundleTime {
                    configured: raw.clone(),
                    fallback_millis: DEFAULT_MAX_BUNDLE_TIME_MILLIS,
                });
                DEFAULT_MAX_BUNDLE_TIME_MILLIS as i64
            }),
        };

        let mut validated = Self::validate(max_items, max_age_millis);
        parse_warnings.append(&mut validated.warnings);
        validated.warnings = parse_warnings;
        validated
    }

    /// Maximum number of items per bundle
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Maximum bundle age
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Maximum bundle age in milliseconds
    pub fn max_age_millis(&self) -> i64 {
        self.max_age.as_millis() as i64
    }

    /// Period of the age-check timer: `max(max_age, 1ms)`
    pub fn check_period(&self) -> Duration {
        self.max_age
            .max(Duration::from_millis(MIN_BUNDLE_CHECK_PERIOD_MILLIS))
    }
}

/// Outcome of threshold validation: the usable policy plus any fallbacks taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedThresholds {
    pub policy: ThresholdPolicy,
    pub warnings: Vec<ThresholdWarning>,
}

impl ValidatedThresholds {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A threshold that was replaced by its default
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "setting", rename_all = "snake_case")]
pub enum ThresholdWarning {
    MaxBundleSize { configured: String, fallback: usize },
    MaxBundleTime {
        configured: String,
        fallback_millis: u64,
    },
}

impl fmt::Display for ThresholdWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdWarning::MaxBundleSize {
                configured,
                fallback,
            } => write!(
                f,
                "Invalid value '{configured}' for the maximum bundle size. Using default value of {fallback}."
            ),
            ThresholdWarning::MaxBundleTime {
                configured,
                fallback_millis,
            } => write!(
                f,
                "Invalid value '{configured}' for the maximum bundle time. Using default value of {fallback_millis} milliseconds."
            ),
        }
    }
}
