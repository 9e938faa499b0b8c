//! Topic topology and idempotent bootstrap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::clients::TopicAdmin;
use super::errors::{MessagingError, MessagingResult};
use crate::constants::{topic_settings, topics};
use crate::logging::log_queue_operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Normal,
    Express,
    Retry,
    DeadLetter,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Normal, Topic::Express, Topic::Retry, Topic::DeadLetter];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => topics::NORMAL,
            Self::Express => topics::EXPRESS,
            Self::Retry => topics::RETRY,
            Self::DeadLetter => topics::DEAD_LETTER,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Channel topics are the ones a caller can send to directly
    pub fn is_channel(&self) -> bool {
        matches!(self, Self::Normal | Self::Express)
    }

    pub fn partitions(&self) -> i32 {
        match self {
            Self::Normal => topic_settings::NORMAL_PARTITIONS,
            Self::Express => topic_settings::EXPRESS_PARTITIONS,
            Self::Retry => topic_settings::RETRY_PARTITIONS,
            Self::DeadLetter => topic_settings::DEAD_LETTER_PARTITIONS,
        }
    }

    /// Creation settings for this topic
    pub fn spec(&self, replication_factor: i32) -> TopicSpec {
        let mut config = BTreeMap::new();
        config.insert(
            "segment.bytes".to_string(),
            topic_settings::SEGMENT_BYTES.to_string(),
        );

        match self {
            Self::Normal => {
                config.insert(
                    "retention.bytes".to_string(),
                    topic_settings::NORMAL_RETENTION_BYTES.to_string(),
                );
                config.insert(
                    "max.message.bytes".to_string(),
                    topic_settings::NORMAL_MAX_MESSAGE_BYTES.to_string(),
                );
            }
            Self::Express => {
                config.insert(
                    "retention.bytes".to_string(),
                    topic_settings::EXPRESS_RETENTION_BYTES.to_string(),
                );
            }
            Self::Retry => {
                config.insert(
                    "retention.ms".to_string(),
                    topic_settings::RETRY_RETENTION_MS.to_string(),
                );
            }
            Self::DeadLetter => {
                config.insert(
                    "retention.ms".to_string(),
                    topic_settings::DEAD_LETTER_RETENTION_MS.to_string(),
                );
            }
        }

        TopicSpec {
            name: self.name().to_string(),
            partitions: self.partitions(),
            replication_factor,
            config,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to create one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub config: BTreeMap<String, String>,
}

/// Specs for the configured topic names; unknown names are rejected
pub fn topology(names: &[String], replication_factor: i32) -> MessagingResult<Vec<TopicSpec>> {
    names
        .iter()
        .map(|name| {
            Topic::from_name(name)
                .map(|topic| topic.spec(replication_factor))
                .ok_or_else(|| MessagingError::UnknownTopic {
                    topic: name.clone(),
                })
        })
        .collect()
}

/// Create the topics that do not exist yet; returns the names created
pub async fn ensure_topics(
    admin: &dyn TopicAdmin,
    specs: &[TopicSpec],
) -> MessagingResult<Vec<String>> {
    let existing = admin.existing_topics().await?;
    let missing: Vec<TopicSpec> = specs
        .iter()
        .filter(|spec| !existing.contains(&spec.name))
        .cloned()
        .collect();

    if missing.is_empty() {
        tracing::debug!(topics = specs.len(), "All topics already exist");
        return Ok(Vec::new());
    }

    admin.create_topics(&missing).await?;

    let created: Vec<String> = missing.into_iter().map(|spec| spec.name).collect();
    for name in &created {
        log_queue_operation(
            crate::constants::operations::QUEUE_BOOTSTRAP,
            name,
            "created",
            None,
        );
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_table() {
        let normal = Topic::Normal.spec(1);
        assert_eq!(normal.name, "event.prod");
        assert_eq!(normal.partitions, 50);
        assert_eq!(normal.config["retention.bytes"], "107374182400");
        assert_eq!(normal.config["segment.bytes"], "536870912");
        assert_eq!(normal.config["max.message.bytes"], "1000000");

        let express = Topic::Express.spec(1);
        assert_eq!(express.partitions, 30);
        assert_eq!(express.config["retention.bytes"], "53687091200");

        let retry = Topic::Retry.spec(1);
        assert_eq!(retry.partitions, 20);
        assert_eq!(retry.config["retention.ms"], "86400000");

        let dlq = Topic::DeadLetter.spec(3);
        assert_eq!(dlq.name, "event.dlq");
        assert_eq!(dlq.partitions, 10);
        assert_eq!(dlq.replication_factor, 3);
        assert_eq!(dlq.config["retention.ms"], "2592000000");
    }

    #[test]
    fn test_channel_topics() {
        assert!(Topic::from_name("event.prod").unwrap().is_channel());
        assert!(Topic::from_name("event.express").unwrap().is_channel());
        assert!(!Topic::Retry.is_channel());
        assert_eq!(Topic::from_name("event.sms"), None);
    }

    #[test]
    fn test_topology_rejects_unknown_names() {
        let names = vec!["event.prod".to_string(), "event.bogus".to_string()];
        assert!(matches!(
            topology(&names, 1),
            Err(MessagingError::UnknownTopic { .. })
        ));
    }
}
