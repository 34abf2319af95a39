use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sensorflow::bus::FileTopic;
use sensorflow::ingest::{BatchPublisher, RecordSource, SourceSelector};
use sensorflow::observe::{LogObserver, Observer, PipelineEvent};
use sensorflow::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "sensor-producer")]
#[command(about = "Publish a delimited sensor source to the measurement topic")]
struct Args {
    /// Default source (CSV or CSV.GZ), used when no replica chunk applies
    #[arg(long, default_value = "/data/2025-06_bme280.csv")]
    input: PathBuf,

    /// Directory holding chunk_<n>.csv replica sources
    #[arg(long, default_value = "/data/chunks")]
    chunk_dir: PathBuf,

    /// Replica id selecting <chunk-dir>/chunk_<n>.csv
    #[arg(long, env = "CHUNK_NUM")]
    chunk_num: Option<String>,

    /// Bus root holding the topic directory
    #[arg(long, default_value = "./data/bus")]
    bus_root: PathBuf,

    /// JSON pipeline config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Messages per publish call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Topic name
    #[arg(long)]
    topic: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(size) = args.batch_size {
        config.publish_batch_size = size;
    }
    if let Some(topic) = args.topic {
        config.topic = topic;
    }
    config.validate().context("invalid pipeline config")?;

    let observer = LogObserver;
    let selected =
        SourceSelector::new(&args.input, &args.chunk_dir).select(args.chunk_num.as_deref());
    observer.observe(PipelineEvent::SourceSelected {
        path: selected.path.clone(),
        reason: selected.reason.clone(),
    });

    let source = RecordSource::open(&selected.path)
        .with_context(|| format!("failed to open source {}", selected.path.display()))?;
    let topic = FileTopic::open(&args.bus_root, &config.topic, config.channel_partitions)
        .with_context(|| format!("failed to open topic {}", config.topic))?
        .with_max_attempts(config.max_publish_attempts);

    info!("Publishing {} to topic {}", selected.path.display(), config.topic);
    let stats = BatchPublisher::new(topic.publisher(), &config, observer)
        .run(source)
        .context("publish failed")?;

    println!(
        "published lines={} produced={} batches={} skipped={} elapsed={:.2}s rate={:.0}/s",
        stats.lines,
        stats.produced,
        stats.batches,
        stats.skipped,
        stats.duration.as_secs_f64(),
        stats.throughput()
    );
    Ok(())
}
