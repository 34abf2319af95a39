//! Producer side: reading delimited sources and publishing them.
//!
//! ```no_run
//! use sensorflow::bus::FileTopic;
//! use sensorflow::ingest::{BatchPublisher, RecordSource};
//! use sensorflow::observe::LogObserver;
//! use sensorflow::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! let topic = FileTopic::open("./bus", &config.topic, config.channel_partitions)?;
//! let stats = BatchPublisher::new(topic.publisher(), &config, LogObserver)
//!     .run(RecordSource::open("./data/2025-06-01_bme280.csv")?)?;
//! println!("produced {}", stats.produced);
//! # Ok::<(), sensorflow::Error>(())
//! ```

pub mod chunk;
mod publisher;
mod source;

pub use publisher::{BatchPublisher, PublishStats};
pub use source::{
    chunk_file_name, open_input, RecordSource, SelectedSource, SourceLine, SourceSelector,
};
