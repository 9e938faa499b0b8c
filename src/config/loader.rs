//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are merged
//! in precedence order, validated, and logged with sensitive values masked.

use super::error::{ConfigResult, ConfigurationError};
use super::SmsGateConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "smsgate";
const ENV_PREFIX: &str = "SMSGATE";
const ENV_SEPARATOR: &str = "__";

/// Current deployment environment: `SMSGATE_ENV`, then `APP_ENV`, then `development`
pub fn detect_environment() -> String {
    env::var("SMSGATE_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

#[derive(Debug)]
pub struct ConfigManager {
    config: SmsGateConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit environment,
    /// leaving process-wide environment detection untouched
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        let sanitized_config = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized_config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            queue_host = %config.queue.host,
            topics = config.queue.topics.len(),
            max_connections = config.database.max_connections,
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, e.g. in tests
    pub fn from_config(config: SmsGateConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &SmsGateConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn default_config_directory() -> PathBuf {
        env::var("SMSGATE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<SmsGateConfig> {
        let load_error = |e: config::ConfigError| ConfigurationError::load_error(environment, e);

        let defaults = Config::try_from(&SmsGateConfig::default()).map_err(load_error)?;
        let base_file = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key("queue.topics")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())
            .map_err(load_error)?
            .build()
            .map_err(load_error)?
            .try_deserialize::<SmsGateConfig>()
            .map_err(load_error)
    }

    fn sanitize_config_for_logging(config: &SmsGateConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().queue.max_retry_attempts, 3);
        assert_eq!(manager.config().billing.max_message_length, 160);
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("smsgate.toml"),
            r#"
[queue]
host = "kafka-base:9092"
consumer_read_ttl_ms = 2500
retry_delay_seconds = 5

[billing]
message_price = "7.25"
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("smsgate.staging.toml"),
            r#"
[queue]
host = "kafka-staging:9092"
"#,
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
                .unwrap();
        let config = manager.config();

        assert_eq!(config.queue.host, "kafka-staging:9092");
        assert_eq!(config.queue.consumer_read_ttl_ms, 2500);
        assert_eq!(config.queue.retry_delay_seconds, 5);
        assert_eq!(config.billing.message_price, "7.25");
        // untouched sections keep their defaults
        assert_eq!(config.queue.topics.len(), 4);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("smsgate.toml"),
            "[queue]\nmax_retry_attempts = 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_debug_config_masks_connection_strings() {
        let manager = ConfigManager::from_config(SmsGateConfig::default(), "test").unwrap();
        let dumped = manager.debug_config();
        assert_eq!(dumped["database"]["url"], "[MASKED]");
        assert_eq!(dumped["queue"]["host"], "localhost:9092");
    }
}
