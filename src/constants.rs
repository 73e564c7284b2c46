//! # System Constants
//!
//! Defaults and configuration keys that define the operational boundaries of
//! the bundling coordinator.

/// Default maximum number of items in one bundle
pub const DEFAULT_MAX_BUNDLE_SIZE: usize = 1000;

/// Default maximum bundle age in milliseconds
pub const DEFAULT_MAX_BUNDLE_TIME_MILLIS: u64 = 1000;

/// Lower bound for the age-check timer period
pub const MIN_BUNDLE_CHECK_PERIOD_MILLIS: u64 = 1;

/// Job parameter keys understood by `ThresholdPolicy::from_job_parameters`
pub mod job_parameters {
    pub const MAX_BUNDLE_SIZE: &str = "bundle.max-size";
    pub const MAX_BUNDLE_TIME_MILLIS: &str = "bundle.max-time-millis";
}

/// Environment variables read by configuration and logging
pub mod environment {
    /// Prefix for configuration overrides, e.g. `BUNDLER_MAX_BUNDLE_SIZE`
    pub const CONFIG_PREFIX: &str = "BUNDLER";
    pub const ENVIRONMENT: &str = "BUNDLER_ENV";
    pub const LOG_FORMAT: &str = "BUNDLER_LOG_FORMAT";
}
