//! Consumer side: channel messages into measurement tables.
//!
//! ```no_run
//! use sensorflow::bus::FileTopic;
//! use sensorflow::observe::LogObserver;
//! use sensorflow::storage::FileStorage;
//! use sensorflow::stream::StreamRouter;
//! use sensorflow::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! let topic = FileTopic::open("./bus", &config.topic, config.channel_partitions)?;
//! let storage = FileStorage::open("./tables", &config.keyspace)?;
//! let stats = StreamRouter::new(
//!     topic.subscriber(&config.consumer_group)?,
//!     &storage,
//!     &config,
//!     LogObserver,
//! )
//! .run()?;
//! println!("inserted {} into {:?}", stats.inserted, stats.table);
//! # Ok::<(), sensorflow::Error>(())
//! ```

mod router;
mod throughput;

pub use router::{decode_message, ConsumeStats, StreamRouter};
pub use throughput::{ThroughputSample, ThroughputSampler};
