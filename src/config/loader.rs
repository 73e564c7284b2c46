//! Configuration Loader
//!
//! Layers an optional configuration file (TOML, YAML or JSON, chosen by
//! extension) under `BUNDLER_*` environment overrides using the `config` crate.

use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::BundleConfig;
use crate::constants::environment::CONFIG_PREFIX;

impl BundleConfig {
    /// Load configuration from an optional file plus process environment overrides
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_from_sources(path, None)
    }

    /// Load configuration with an explicit environment map.
    ///
    /// Passing `Some(map)` replaces the process environment, which keeps tests
    /// independent of variables set by other tests.
    pub fn load_from_sources(
        path: Option<&Path>,
        environment: Option<HashMap<String, String>>,
    ) -> ConfigResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::file_not_found(
                    path.display().to_string(),
                ));
            }
            debug!(config_file = %path.display(), "Loading bundle configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_PREFIX)
                .try_parsing(true)
                .source(environment),
        );

        let merged = builder.build().map_err(|e| {
            let source_name = path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "environment".to_string());
            ConfigurationError::load_error(source_name, e)
        })?;

        let config: BundleConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::deserialize_error)?;

        debug!(
            max_bundle_size = config.max_bundle_size,
            max_bundle_time_millis = config.max_bundle_time_millis,
            "Bundle configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = BundleConfig::load_from_sources(None, Some(HashMap::new())).unwrap();
        assert_eq!(config, BundleConfig::default());
    }

    #[test]
    fn test_file_values() {
        let file = toml_file("max_bundle_size = 25\nmax_bundle_time_millis = 300\n");
        let config = BundleConfig::load_from_sources(Some(file.path()), Some(HashMap::new()))
            .unwrap();
        assert_eq!(config.max_bundle_size, 25);
        assert_eq!(config.max_bundle_time_millis, 300);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = toml_file("max_bundle_size = 25\n");
        let mut env = HashMap::new();
        env.insert("BUNDLER_MAX_BUNDLE_SIZE".to_string(), "7".to_string());

        let config = BundleConfig::load_from_sources(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.max_bundle_size, 7);
        assert_eq!(
            config.max_bundle_time_millis,
            BundleConfig::default().max_bundle_time_millis
        );
    }

    #[test]
    fn test_negative_values_survive_loading() {
        let file = toml_file("max_bundle_size = -3\n");
        let config = BundleConfig::load_from_sources(Some(file.path()), Some(HashMap::new()))
            .unwrap();
        assert_eq!(config.max_bundle_size, -3);
        assert!(config.threshold_policy().has_warnings());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = BundleConfig::load_from_sources(
            Some(Path::new("/nonexistent/bundler.toml")),
            Some(HashMap::new()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::FileNotFound { .. })
        ));
    }
}
