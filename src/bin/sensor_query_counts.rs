use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sensorflow::observe::LogObserver;
use sensorflow::query::QueryEngine;
use sensorflow::storage::FileStorage;
use sensorflow::table::PartitionKey;
use sensorflow::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "sensor-query-counts")]
#[command(about = "Count stored measurements per hour of one sensor-type/day table")]
struct Args {
    /// Sensor type
    #[arg(long, default_value = "BME280")]
    sensor: String,

    /// Day (YYYY_MM_DD or YYYY-MM-DD)
    #[arg(long, default_value = "2025_06_01")]
    day: String,

    /// Query only this hour (0-23)
    #[arg(long)]
    hour: Option<u8>,

    /// Parallel workers for the all-hours query
    #[arg(long)]
    workers: Option<usize>,

    /// Single query mode; requires --hour
    #[arg(long)]
    single: bool,

    /// Comma-separated storage roots; the first holding the keyspace is used
    #[arg(long, default_value = "./data/tables")]
    host: String,

    /// JSON pipeline config
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let workers = args.workers.unwrap_or(config.query_workers);

    let roots = split_hosts(&args.host);
    let storage = FileStorage::connect(&roots, &config.keyspace, false)
        .with_context(|| format!("failed to connect to keyspace {}", config.keyspace))?;
    let key = PartitionKey::new(&args.sensor, &args.day).context("invalid table key")?;

    info!("Connected to storage. Table: {}.{}", config.keyspace, key.table_name());
    let engine = QueryEngine::new(&storage, key, LogObserver);

    if args.single || args.hour.is_some() {
        let hour = args
            .hour
            .context("--single requires --hour between 0 and 23")?;
        let result = engine.run_single(hour)?;
        println!("{result}");
        return Ok(if result.count.is_ok() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    info!("Using {workers} parallel workers");
    let report = engine.run_all(workers)?;
    print!("{report}");
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn split_hosts(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .collect()
}
