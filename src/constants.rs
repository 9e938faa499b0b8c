//! # System Constants
//!
//! Topic names, billing rules and pagination limits shared by the orchestrator,
//! the dispatcher and the consumer group.

/// Broker topics. The two channel topics double as the `channel` value a
/// caller picks when sending a message.
pub mod topics {
    pub const NORMAL: &str = "event.prod";
    pub const EXPRESS: &str = "event.express";
    pub const RETRY: &str = "event.retry";
    pub const DEAD_LETTER: &str = "event.dlq";

    /// Topics a caller may address directly.
    pub const CHANNELS: [&str; 2] = [NORMAL, EXPRESS];
}

/// Per-topic settings applied when a topic is created at bootstrap.
pub mod topic_settings {
    pub const SEGMENT_BYTES: i64 = 536_870_912;
    pub const NORMAL_RETENTION_BYTES: i64 = 107_374_182_400;
    pub const EXPRESS_RETENTION_BYTES: i64 = 53_687_091_200;
    pub const RETRY_RETENTION_MS: i64 = 86_400_000;
    pub const DEAD_LETTER_RETENTION_MS: i64 = 2_592_000_000;
    pub const NORMAL_MAX_MESSAGE_BYTES: i64 = 1_000_000;

    pub const NORMAL_PARTITIONS: i32 = 50;
    pub const EXPRESS_PARTITIONS: i32 = 30;
    pub const RETRY_PARTITIONS: i32 = 20;
    pub const DEAD_LETTER_PARTITIONS: i32 = 10;
}

pub mod billing {
    /// Fixed price debited per message, as an exact decimal literal.
    pub const DEFAULT_MESSAGE_PRICE: &str = "8.9";
    pub const MAX_MESSAGE_LENGTH: usize = 160;
}

pub mod delivery {
    pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
    pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 3;
    pub const DEFAULT_CONSUMER_READ_TTL_MS: u64 = 1_000;
    pub const DEFAULT_PRODUCER_FLUSH_TTL_MS: u64 = 5_000;
    pub const DEFAULT_ADMIN_TIMEOUT_SECONDS: u64 = 30;
    pub const DEFAULT_METADATA_TIMEOUT_SECONDS: u64 = 10;
}

pub mod pagination {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 50;
}

/// Event names carried in the `operation` field of structured log records.
pub mod operations {
    pub const MESSAGE_SEND: &str = "message.send";
    pub const MESSAGE_CREATE_TX_BEGIN: &str = "message.create.tx.begin";
    pub const MESSAGE_CREATE_TX_COMMIT: &str = "message.create.tx.commit";
    pub const MESSAGE_CREATE_TX_ROLLBACK: &str = "message.create.tx.rollback";
    pub const MESSAGE_PUBLISH: &str = "message.publish";
    pub const STATUS_UPDATE: &str = "message.status.update";
    pub const QUEUE_PRODUCE: &str = "queue.producer.produce";
    pub const QUEUE_FLUSH: &str = "queue.producer.flush";
    pub const QUEUE_BOOTSTRAP: &str = "queue.admin.bootstrap";
    pub const CONSUMER_READ: &str = "queue.consumer.read";
    pub const CONSUMER_DECODE: &str = "queue.consumer.decode";
    pub const PROVIDER_SEND: &str = "queue.consumer.provider.send";
    pub const RETRY_ATTEMPT: &str = "queue.consumer.retry.attempt";
    pub const DEAD_LETTER_ROUTE: &str = "queue.consumer.dlq.route";
    pub const OUTBOX_REPLAY: &str = "outbox.replay";
}
