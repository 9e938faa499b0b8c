// Delivery status model
//
// A message and its outbox row move through paired statuses; `DeliveryStage`
// is the only way to name a pair when writing them.

pub mod states;

pub use states::{DeliveryStage, InvalidStatus, MessageStatus, OutboxStatus};
