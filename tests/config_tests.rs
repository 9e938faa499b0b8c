//! The shipped configuration files load and layer as expected.

use std::path::PathBuf;
use std::time::Duration;

use smsgate_core::config::{ConfigManager, LogFormat};

fn shipped_config_dir() -> Option<PathBuf> {
    Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config"))
}

#[test]
fn test_shipped_base_config_matches_defaults() {
    let manager = ConfigManager::load_from_directory_with_env(shipped_config_dir(), "development")
        .unwrap();
    let queue = &manager.config().queue;

    assert_eq!(queue.topics.len(), 4);
    assert_eq!(queue.max_retry_attempts, 3);
    assert_eq!(queue.retry_backoff_unit(), Duration::from_secs(3));
    assert_eq!(manager.config().billing.message_price, "8.9");
}

#[test]
fn test_test_environment_shortens_timeouts() {
    let manager =
        ConfigManager::load_from_directory_with_env(shipped_config_dir(), "test").unwrap();
    let config = manager.config();

    assert_eq!(config.queue.consumer_read_timeout(), Duration::from_millis(50));
    assert_eq!(config.queue.retry_backoff_unit(), Duration::from_millis(5));
    assert_eq!(config.logging.level.as_deref(), Some("warn"));
    // inherited from the base file
    assert_eq!(config.billing.max_message_length, 160);
}

#[test]
fn test_production_logs_json() {
    let manager =
        ConfigManager::load_from_directory_with_env(shipped_config_dir(), "production").unwrap();
    let config = manager.config();

    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.queue.replication_factor, 3);
    assert!(!config.database.run_migrations);
}
