use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sensorflow::bus::FileTopic;
use sensorflow::observe::LogObserver;
use sensorflow::storage::FileStorage;
use sensorflow::stream::StreamRouter;
use sensorflow::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "sensor-consumer")]
#[command(about = "Consume the measurement topic into hour-partitioned tables")]
struct Args {
    /// Bus root holding the topic directory
    #[arg(long, default_value = "./data/bus")]
    bus_root: PathBuf,

    /// Storage root holding the keyspace directory
    #[arg(long, default_value = "./data/tables")]
    storage_root: PathBuf,

    /// JSON pipeline config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Consumer group
    #[arg(long)]
    group: Option<String>,

    /// Rows per storage write
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds between throughput samples
    #[arg(long, env = "THROUGHPUT_LOG_SECONDS")]
    throughput_log_seconds: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(group) = args.group {
        config.consumer_group = group;
    }
    if let Some(size) = args.batch_size {
        config.write_batch_size = size;
    }
    let config = config.with_throughput_override(args.throughput_log_seconds.as_deref());
    config.validate().context("invalid pipeline config")?;

    let topic = FileTopic::open(&args.bus_root, &config.topic, config.channel_partitions)
        .with_context(|| format!("failed to open topic {}", config.topic))?;
    let subscriber = topic
        .subscriber(&config.consumer_group)
        .with_context(|| format!("failed to join group {}", config.consumer_group))?;
    let storage = FileStorage::open(&args.storage_root, &config.keyspace)
        .with_context(|| format!("failed to open keyspace {}", config.keyspace))?;

    info!(
        "Consuming topic {} as {} (batch {}, throughput every {}s)",
        config.topic, config.consumer_group, config.write_batch_size, config.throughput_interval_secs
    );
    let stats = StreamRouter::new(subscriber, &storage, &config, LogObserver)
        .run()
        .context("consume failed")?;

    println!(
        "consumed={} inserted={} batches={} skipped={} table={} elapsed={:.2}s rate={:.0}/s",
        stats.consumed,
        stats.inserted,
        stats.batches,
        stats.skipped,
        stats.table.as_deref().unwrap_or("-"),
        stats.duration.as_secs_f64(),
        stats.throughput()
    );
    Ok(())
}
