//! Pipeline configuration.
//!
//! One value built at process start and passed by reference into the
//! publisher, the stream router and the query engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration shared by every pipeline component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Channel topic name.
    /// Default: "bme280-measurements"
    pub topic: String,

    /// Consumer group used by the stream router.
    /// Default: "bme280-consumer-group"
    pub consumer_group: String,

    /// Storage keyspace holding the measurement tables.
    /// Default: "mysimbdp_weather"
    pub keyspace: String,

    /// Messages per publish call.
    /// Default: 10000
    pub publish_batch_size: usize,

    /// Rows per storage write. Writes cost more than publishes, so this
    /// stays much smaller than `publish_batch_size`.
    /// Default: 25
    pub write_batch_size: usize,

    /// Partitions of the channel topic.
    /// Default: 3
    pub channel_partitions: u32,

    /// Transport-level attempts per publish call.
    /// Default: 3
    pub max_publish_attempts: u32,

    /// Seconds between consumer throughput samples.
    /// Default: 10
    pub throughput_interval_secs: u64,

    /// Workers used by the parallel count query.
    /// Default: 4
    pub query_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic: "bme280-measurements".to_string(),
            consumer_group: "bme280-consumer-group".to_string(),
            keyspace: "mysimbdp_weather".to_string(),
            publish_batch_size: 10_000,
            write_batch_size: 25,
            channel_partitions: 3,
            max_publish_attempts: 3,
            throughput_interval_secs: 10,
            query_workers: 4,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn throughput_interval(&self) -> Duration {
        Duration::from_secs(self.throughput_interval_secs)
    }

    /// Apply a raw `THROUGHPUT_LOG_SECONDS`-style override. Anything that is
    /// not a positive integer leaves the current interval in place.
    pub fn with_throughput_override(mut self, raw: Option<&str>) -> Self {
        if let Some(secs) = raw.and_then(|v| v.trim().parse::<u64>().ok()) {
            if secs > 0 {
                self.throughput_interval_secs = secs;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.publish_batch_size == 0 {
            return Err(Error::Config("publish_batch_size must be positive".into()));
        }
        if self.write_batch_size == 0 {
            return Err(Error::Config("write_batch_size must be positive".into()));
        }
        if self.channel_partitions == 0 {
            return Err(Error::Config("channel_partitions must be positive".into()));
        }
        if self.max_publish_attempts == 0 {
            return Err(Error::Config("max_publish_attempts must be positive".into()));
        }
        if self.throughput_interval_secs == 0 {
            return Err(Error::Config("throughput_interval_secs must be positive".into()));
        }
        if self.query_workers == 0 {
            return Err(Error::Config("query_workers must be positive".into()));
        }
        if self.topic.is_empty() || self.consumer_group.is_empty() || self.keyspace.is_empty() {
            return Err(Error::Config(
                "topic, consumer_group and keyspace must be non-empty".into(),
            ));
        }
        Ok(())
    }
}
