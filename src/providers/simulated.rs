//! Stand-in provider for local runs. Rejects roughly one send in ten so the
//! retry and dead-letter paths get exercised without a real gateway.

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use tracing::debug;

use super::{ProviderError, ProviderResponse, ProviderResult, SmsProvider};

#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    /// One send in `failure_one_in` fails; zero disables failures
    failure_one_in: u32,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self { failure_one_in: 10 }
    }

    pub fn with_failure_one_in(failure_one_in: u32) -> Self {
        Self { failure_one_in }
    }

    pub fn reliable() -> Self {
        Self { failure_one_in: 0 }
    }

    fn should_fail(&self) -> bool {
        match self.failure_one_in {
            0 => false,
            n => rand::thread_rng().gen_range(0..n) == 0,
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmsProvider for SimulatedProvider {
    async fn send(&self, mobile: &str, text: &str) -> ProviderResult<ProviderResponse> {
        if self.should_fail() {
            debug!(mobile, "Simulated provider rejected send");
            return Err(ProviderError::rejected(400, "bad request. try again"));
        }

        debug!(mobile, length = text.chars().count(), "Simulated provider sent message");
        Ok(ProviderResponse::from([
            ("status".to_string(), json!(200)),
            ("result".to_string(), json!("sent")),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reliable_provider_always_sends() {
        let provider = SimulatedProvider::reliable();
        for _ in 0..50 {
            let response = provider.send("09123456789", "hello").await.unwrap();
            assert_eq!(response["status"], 200);
            assert_eq!(response["result"], "sent");
        }
    }

    #[tokio::test]
    async fn test_one_in_one_always_fails() {
        let provider = SimulatedProvider::with_failure_one_in(1);
        let err = provider.send("09123456789", "hello").await.unwrap_err();
        assert_eq!(err, ProviderError::rejected(400, "bad request. try again"));
    }
}
