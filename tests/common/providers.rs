use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use smsgate_core::providers::{ProviderError, ProviderResponse, ProviderResult, SmsProvider};

/// Provider whose outcomes are scripted up front.
///
/// Each send pops the next outcome; once the script runs out every send
/// falls back to `default_ok`.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<bool>>>,
    default_ok: bool,
    calls: Arc<AtomicUsize>,
    sent_to: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn always_ok() -> Self {
        Self::scripted(Vec::new(), true)
    }

    pub fn always_failing() -> Self {
        Self::scripted(Vec::new(), false)
    }

    pub fn scripted(outcomes: Vec<bool>, default_ok: bool) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            default_ok,
            calls: Arc::new(AtomicUsize::new(0)),
            sent_to: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Mobiles of successful sends, in order
    pub fn sent_to(&self) -> Vec<String> {
        self.sent_to.lock().clone()
    }
}

#[async_trait]
impl SmsProvider for ScriptedProvider {
    async fn send(&self, mobile: &str, _text: &str) -> ProviderResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = self.script.lock().pop_front().unwrap_or(self.default_ok);
        if !ok {
            return Err(ProviderError::rejected(400, "scripted failure"));
        }
        self.sent_to.lock().push(mobile.to_string());
        Ok(ProviderResponse::from([(
            "status".to_string(),
            serde_json::json!(200),
        )]))
    }
}
