//! src/dataloader/config.rs
//!
//! Configuration for Loader behaviour.
//!
//! `LoaderConfig` controls batching, output shape and the timing of the pass
//! workers. `BrokerConfig` is only needed in broker mode and describes the topic
//! every pass creates for itself.
//!
//! Example:
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .batch_size(1024)
//!     .shuffle(true)
//!     .output_format(OutputFormat::PyG)
//!     .buffer_size(8)
//!     .build();
//! ```
//!
//! # Memory considerations:
//! - At most `buffer_size * 2` raw batches wait for the decoder and at most
//!   `buffer_size` decoded batches wait for the caller.
//! - `poll_interval` bounds how long any worker blocks before re-checking for
//!   cancellation. Lower is more responsive and costs more wakeups.

use crate::decoder::OutputFormat;
use crate::error::LoaderError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a Loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Identifier used to name per-pass topics. Random 6 letters when unset.
    pub loader_id: Option<String>,
    /// Number of batches per pass. Ignored when `batch_size` is set.
    pub num_batches: usize,
    /// Target records per batch. The batch count is derived from the population.
    pub batch_size: Option<usize>,
    /// Ask the server to shuffle before splitting into batches
    pub shuffle: bool,
    /// Boolean attribute selecting which records take part.
    pub filter_by: Option<String>,
    pub output_format: OutputFormat,
    /// Append an `(i, i)` edge for every node of graph outputs
    pub add_self_loop: bool,
    /// Map vertex ids to contiguous indices in graph outputs
    pub reindex: bool,
    /// Depth of the decoded-batch queue. Must be > 0.
    pub buffer_size: usize,
    /// Remote query timeout, also the longest wait for a single batch. Default: 300s
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// How often blocked workers check for cancellation. Default: 100ms
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Pause between status requests for an asynchronous query. Default: 1s
    #[serde(with = "duration_ms")]
    pub status_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            loader_id: None,
            num_batches: 1,
            batch_size: None,
            shuffle: false,
            filter_by: None,
            output_format: OutputFormat::DataFrame,
            add_self_loop: false,
            reindex: true,
            buffer_size: 4,
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            status_interval: Duration::from_secs(1),
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Rejects settings that would deadlock or produce no batches.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(invalid("buffer_size must be > 0"));
        }
        if self.num_batches == 0 {
            return Err(invalid("num_batches must be > 0"));
        }
        if self.batch_size == Some(0) {
            return Err(invalid("batch_size must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval must be > 0"));
        }
        if self.timeout < self.poll_interval {
            return Err(invalid("timeout must not be shorter than poll_interval"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> anyhow::Error {
    LoaderError::InvalidConfig(msg.to_string()).into()
}

/// Builder for LoaderConfig with method chaining
#[derive(Default)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn loader_id(mut self, id: impl Into<String>) -> Self {
        self.config.loader_id = Some(id.into());
        self
    }

    /// Set the number of batches per pass
    pub fn num_batches(mut self, num_batches: usize) -> Self {
        self.config.num_batches = num_batches;
        self
    }

    /// Set the batch size. Takes precedence over `num_batches`.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = Some(size);
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    pub fn filter_by(mut self, attribute: impl Into<String>) -> Self {
        self.config.filter_by = Some(attribute.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn add_self_loop(mut self, add: bool) -> Self {
        self.config.add_self_loop = add;
        self
    }

    pub fn reindex(mut self, reindex: bool) -> Self {
        self.config.reindex = reindex;
        self
    }

    /// Set the queue depth between decoder and caller
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the remote query timeout.
    ///
    /// - Too low: slow queries are abandoned
    /// - Too high: stuck passes take longer to surface
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the worker polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn status_interval(mut self, interval: Duration) -> Self {
        self.config.status_interval = interval;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

/// Message broker settings for broker mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the loader's consumer connects to
    pub address: String,
    /// Address the database publishes to, when it differs from `address`
    pub producer_address: Option<String>,
    pub max_message_bytes: u64,
    pub num_partitions: u32,
    pub replication_factor: u16,
    pub retention_ms: u64,
    /// Delete each pass's topic on reset
    pub auto_delete_topic: bool,
    /// Longest single wait on the consumer
    #[serde(with = "duration_ms")]
    pub poll_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            producer_address: None,
            max_message_bytes: 104_857_600,
            num_partitions: 1,
            replication_factor: 1,
            retention_ms: 60_000,
            auto_delete_topic: true,
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl BrokerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn producer_address(&self) -> &str {
        self.producer_address.as_deref().unwrap_or(&self.address)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(invalid("broker address must not be empty"));
        }
        if self.num_partitions == 0 || self.replication_factor == 0 {
            return Err(invalid("topic partitions and replication factor must be > 0"));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
