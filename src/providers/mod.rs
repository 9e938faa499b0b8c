//! # SMS Providers
//!
//! The outbound edge of delivery. A provider makes exactly one send attempt per
//! call; retrying is the consumer group's job.

pub mod simulated;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub use simulated::SimulatedProvider;

/// Provider-specific response fields
pub type ProviderResponse = HashMap<String, Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered and refused the message
    #[error("Provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider could not be reached or did not answer in time
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send(&self, mobile: &str, text: &str) -> ProviderResult<ProviderResponse>;
}
