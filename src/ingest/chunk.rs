//! Source preparation: splitting a source into replica chunks and
//! extracting a single day.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Reader, StringRecord, Trim, Writer, WriterBuilder};

use crate::ingest::source::{chunk_file_name, open_input, source_reader_builder, SOURCE_DELIMITER};
use crate::record::day_of;
use crate::{Error, Result};

/// Timestamp column of the source layout.
const TIMESTAMP_FIELD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub path: PathBuf,
    /// Zero-based index of the first data row in the source.
    pub first_row: u64,
    pub rows: u64,
}

/// Split `input` into `chunks` contiguous files `chunk_<i>.csv` under
/// `output_dir`, each starting with the source header. Rows are copied
/// unchanged, surrounding whitespace included. Rows are spread by
/// ceiling division, so trailing chunks may be short; chunks that would be
/// empty are not written.
pub fn split_into_chunks(input: &Path, output_dir: &Path, chunks: u32) -> Result<Vec<ChunkInfo>> {
    if chunks == 0 {
        return Err(Error::Config("chunk count must be at least 1".into()));
    }
    let total = count_rows(input)?;
    let per_chunk = total.div_ceil(u64::from(chunks)).max(1);
    fs::create_dir_all(output_dir)?;

    let mut reader = verbatim_reader(input)?;
    let header = reader.headers()?.clone();
    let mut record = StringRecord::new();

    let mut written = Vec::new();
    let mut row = 0u64;
    for index in 0..chunks {
        let first_row = u64::from(index) * per_chunk;
        if first_row >= total {
            break;
        }
        let rows = per_chunk.min(total - first_row);
        let path = output_dir.join(chunk_file_name(index));
        let mut writer = chunk_writer(&path)?;
        writer.write_record(&header)?;
        for _ in 0..rows {
            if !reader.read_record(&mut record)? {
                break;
            }
            writer.write_record(&record)?;
            row += 1;
        }
        writer.flush()?;
        log::info!(
            "Created {}: rows {first_row}-{} ({rows} records)",
            path.display(),
            row.saturating_sub(1)
        );
        written.push(ChunkInfo {
            path,
            first_row,
            rows,
        });
    }
    Ok(written)
}

/// Copy the header and every row whose timestamp falls on `day` into
/// `<output_dir>/<day>_<suffix>.csv`. Rows too short to carry a timestamp
/// are skipped. Finding no rows is an error.
pub fn extract_day(input: &Path, output_dir: &Path, day: &str, suffix: &str) -> Result<(PathBuf, u64)> {
    let mut reader = verbatim_reader(input)?;
    let header = reader.headers()?.clone();
    let mut record = StringRecord::new();
    let mut matched = Vec::new();

    while reader.read_record(&mut record)? {
        let Some(timestamp) = record.get(TIMESTAMP_FIELD) else {
            continue;
        };
        if day_of(timestamp.trim()) == day {
            matched.push(record.clone());
        }
    }
    if matched.is_empty() {
        return Err(Error::NoRowsForDay(day.to_string()));
    }

    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{day}_{suffix}.csv"));
    let mut writer = chunk_writer(&path)?;
    writer.write_record(&header)?;
    for record in &matched {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok((path, matched.len() as u64))
}

/// Source reader that leaves field contents untouched.
fn verbatim_reader(input: &Path) -> Result<Reader<Box<dyn Read>>> {
    let mut builder = source_reader_builder();
    builder.trim(Trim::None);
    Ok(builder.from_reader(open_input(input)?))
}

fn count_rows(input: &Path) -> Result<u64> {
    let mut reader = source_reader_builder().from_reader(open_input(input)?);
    let mut record = StringRecord::new();
    let mut rows = 0;
    while reader.read_record(&mut record)? {
        rows += 1;
    }
    Ok(rows)
}

fn chunk_writer(path: &Path) -> Result<Writer<File>> {
    Ok(WriterBuilder::new()
        .delimiter(SOURCE_DELIMITER)
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .from_path(path)?)
}
