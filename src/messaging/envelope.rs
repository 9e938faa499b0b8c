//! Wire payload shared by all four topics.

use serde::{Deserialize, Serialize};

use super::errors::MessagingResult;
use crate::models::Message;
use crate::state_machine::MessageStatus;

/// JSON record published for a message. Consumers use it only to find the
/// rows to update; balance decisions never read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub tenant_id: i64,
    pub message_id: i64,
    pub outbox_id: i64,
    pub channel: String,
    pub mobile: String,
    pub message_text: String,
    pub message_hash: String,
    pub status: MessageStatus,
}

impl Envelope {
    /// Envelope for a freshly inserted message; the outbox id is attached later
    pub fn from_message(message: &Message) -> Self {
        Self {
            tenant_id: message.tenant_id,
            message_id: message.id,
            outbox_id: 0,
            channel: message.channel.clone(),
            mobile: message.mobile.clone(),
            message_text: message.message_text.clone(),
            message_hash: message.message_hash.clone(),
            status: message.status,
        }
    }

    pub fn with_outbox_id(mut self, outbox_id: i64) -> Self {
        self.outbox_id = outbox_id;
        self
    }

    /// Partition key: the content hash
    pub fn key(&self) -> &[u8] {
        self.message_hash.as_bytes()
    }

    pub fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn to_value(&self) -> MessagingResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> MessagingResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_value(value: serde_json::Value) -> MessagingResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessagingError;

    fn sample() -> Envelope {
        Envelope {
            tenant_id: 1,
            message_id: 10,
            outbox_id: 11,
            channel: "event.express".to_string(),
            mobile: "09120000000".to_string(),
            message_text: "hi".to_string(),
            message_hash: "f".repeat(64),
            status: MessageStatus::Queued,
        }
    }

    #[test]
    fn test_wire_field_names() {
        let value = sample().to_value().unwrap();
        for field in [
            "tenantId",
            "messageId",
            "outboxId",
            "channel",
            "mobile",
            "messageText",
            "messageHash",
            "status",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["status"], "queued");
    }

    #[test]
    fn test_decodes_producer_payload() {
        let raw = br#"{"tenantId":3,"messageId":4,"outboxId":5,"channel":"event.prod","mobile":"9121234567","messageText":"code 1234","messageHash":"abc","status":"queued"}"#;
        let envelope = Envelope::from_bytes(raw).unwrap();
        assert_eq!(envelope.outbox_id, 5);
        assert_eq!(envelope.key(), b"abc");
    }

    #[test]
    fn test_garbage_is_a_deserialization_error() {
        let err = Envelope::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, MessagingError::MessageDeserialization { .. }));
    }
}
