use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A status column held a value outside the known set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} status: {value}")]
pub struct InvalidStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle of a message as seen by the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Persisted and billed, not yet picked up by a consumer
    #[default]
    Queued,
    /// A consumer is handing the message to the provider
    Sending,
    /// The provider accepted the message
    Sent,
    /// The provider confirmed handset delivery
    Delivered,
    /// Retries exhausted
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            _ => Err(InvalidStatus {
                kind: "message",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for MessageStatus {
    type Error = InvalidStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle of the delivery obligation recorded in the outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    #[default]
    Pending,
    Publishing,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "publishing" => Ok(Self::Publishing),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            _ => Err(InvalidStatus {
                kind: "outbox",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for OutboxStatus {
    type Error = InvalidStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The only status combinations a message and its outbox row may hold together.
///
/// Status writes go through a stage, never through a free pair of statuses, so
/// an illegal combination cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    /// queued / pending
    Queued,
    /// sending / publishing
    Sending,
    /// sent / published
    Sent,
    /// failed / failed
    Failed,
}

impl DeliveryStage {
    pub fn message_status(&self) -> MessageStatus {
        match self {
            Self::Queued => MessageStatus::Queued,
            Self::Sending => MessageStatus::Sending,
            Self::Sent => MessageStatus::Sent,
            Self::Failed => MessageStatus::Failed,
        }
    }

    pub fn outbox_status(&self) -> OutboxStatus {
        match self {
            Self::Queued => OutboxStatus::Pending,
            Self::Sending => OutboxStatus::Publishing,
            Self::Sent => OutboxStatus::Published,
            Self::Failed => OutboxStatus::Failed,
        }
    }

    pub fn pair(&self) -> (MessageStatus, OutboxStatus) {
        (self.message_status(), self.outbox_status())
    }

    /// Recover the stage from a stored pair; `None` means the rows disagree
    pub fn from_pair(message: MessageStatus, outbox: OutboxStatus) -> Option<Self> {
        [Self::Queued, Self::Sending, Self::Sent, Self::Failed]
            .into_iter()
            .find(|stage| stage.pair() == (message, outbox))
    }
}

impl fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.message_status(), self.outbox_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_pairs() {
        assert_eq!(
            DeliveryStage::Queued.pair(),
            (MessageStatus::Queued, OutboxStatus::Pending)
        );
        assert_eq!(
            DeliveryStage::Sending.pair(),
            (MessageStatus::Sending, OutboxStatus::Publishing)
        );
        assert_eq!(
            DeliveryStage::Sent.pair(),
            (MessageStatus::Sent, OutboxStatus::Published)
        );
        assert_eq!(
            DeliveryStage::Failed.pair(),
            (MessageStatus::Failed, OutboxStatus::Failed)
        );
    }

    #[test]
    fn test_from_pair_rejects_mixed_statuses() {
        assert_eq!(
            DeliveryStage::from_pair(MessageStatus::Sent, OutboxStatus::Published),
            Some(DeliveryStage::Sent)
        );
        assert_eq!(
            DeliveryStage::from_pair(MessageStatus::Sent, OutboxStatus::Pending),
            None
        );
        assert_eq!(
            DeliveryStage::from_pair(MessageStatus::Delivered, OutboxStatus::Published),
            None
        );
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in ["queued", "sending", "sent", "delivered", "failed"] {
            let parsed: MessageStatus = status.parse().unwrap();
            assert_eq!(parsed.to_string(), status);
        }
        assert!("archived".parse::<OutboxStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&OutboxStatus::Publishing).unwrap(),
            "\"publishing\""
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(MessageStatus::Failed.is_terminal());
        assert!(!MessageStatus::Sending.is_terminal());
        assert!(OutboxStatus::Published.is_terminal());
        assert!(!OutboxStatus::Pending.is_terminal());
    }
}
