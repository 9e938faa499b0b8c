pub mod providers;
pub mod strategies;

pub use providers::*;

use std::future::Future;
use std::time::Duration;

use smsgate_core::config::SmsGateConfig;

/// Defaults with short timeouts so the loops notice shutdown quickly
pub fn fast_config() -> SmsGateConfig {
    let mut config = SmsGateConfig::default();
    config.queue.consumer_read_ttl_ms = 10;
    config.queue.producer_flush_ttl_ms = 100;
    config.queue.retry_delay_ms = Some(5);
    config
}

/// Poll `check` until it returns true or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
