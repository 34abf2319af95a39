use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sensorflow::ingest::chunk::{extract_day, split_into_chunks};

#[derive(Parser, Debug)]
#[command(name = "sensor-chunk")]
#[command(about = "Prepare sensor sources: replica chunks and single-day extracts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a source into N chunk_<i>.csv files, header kept in each
    Split {
        /// Input CSV or CSV.GZ path
        #[arg(long)]
        input: PathBuf,

        /// Output directory for the chunks
        #[arg(long, default_value = "/data/chunks")]
        output_dir: PathBuf,

        /// Number of chunks
        #[arg(long, default_value_t = 3)]
        chunks: u32,
    },
    /// Copy every row of one day into <day>_<suffix>.csv
    ExtractDay {
        /// Input CSV or CSV.GZ path
        #[arg(long)]
        input: PathBuf,

        /// Output directory
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Day to keep (YYYY-MM-DD)
        #[arg(long)]
        day: String,

        /// Output file name suffix
        #[arg(long, default_value = "bme280")]
        suffix: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Split {
            input,
            output_dir,
            chunks,
        } => {
            let written = split_into_chunks(&input, &output_dir, chunks)
                .with_context(|| format!("failed to split {}", input.display()))?;
            let rows: u64 = written.iter().map(|c| c.rows).sum();
            println!("chunks={} rows={rows}", written.len());
        }
        Command::ExtractDay {
            input,
            output_dir,
            day,
            suffix,
        } => {
            let (path, rows) = extract_day(&input, &output_dir, &day, &suffix)
                .with_context(|| format!("failed to extract {day} from {}", input.display()))?;
            println!("wrote {rows} rows to {}", path.display());
        }
    }
    Ok(())
}
