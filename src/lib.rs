//! Sensor measurement ingestion pipeline.
//!
//! Delimited source lines are normalized into [`record::Measurement`]s,
//! published in batches to a partitioned channel ([`bus`]), consumed by a
//! router that lazily creates one table per `(sensor_type, day)` and writes
//! hour-partitioned rows ([`stream`], [`storage`]), and counted per hour by a
//! fan-out query engine ([`query`]).

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod observe;
pub mod query;
pub mod record;
pub mod storage;
pub mod stream;
pub mod table;

pub use config::PipelineConfig;
pub use error::{Error, Result};
