//! src/transport.rs
//!
//! Message broker used as the delivery side-channel in broker mode.
//!
//! The database publishes every batch of a pass into a dedicated topic. The
//! loader's downloader polls that topic and reassembles paired halves.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the per-pass topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    pub num_partitions: u32,
    pub replication_factor: u16,
    pub retention_ms: u64,
    pub max_message_bytes: u64,
}

/// One record delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl BrokerMessage {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}

/// Admin plus consumer view of a broker.
///
/// Admin calls report the broker's numeric error code, `0` meaning success.
pub trait Broker: Send + Sync {
    /// Address used when reporting errors.
    fn address(&self) -> &str;

    fn topic_exists(&self, topic: &str) -> Result<bool>;

    fn create_topic(&self, spec: &TopicSpec) -> Result<i32>;

    fn subscribe(&self, topic: &str) -> Result<()>;

    /// Waits up to `timeout` for new records. An empty vector is not an error.
    fn poll(&self, timeout: Duration) -> Result<Vec<BrokerMessage>>;

    fn unsubscribe(&self) -> Result<()>;

    fn delete_topic(&self, topic: &str) -> Result<i32>;
}
