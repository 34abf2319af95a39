//! Delimited measurement sources.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::record::{normalize_fields, Measurement};
use crate::{Error, Result};

pub const SOURCE_DELIMITER: u8 = b';';

/// Picks the input file for one producer replica.
#[derive(Debug, Clone)]
pub struct SourceSelector {
    default_path: PathBuf,
    chunk_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedSource {
    pub path: PathBuf,
    pub reason: String,
}

impl SourceSelector {
    pub fn new(default_path: impl Into<PathBuf>, chunk_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_path: default_path.into(),
            chunk_dir: chunk_dir.into(),
        }
    }

    pub fn chunk_path(&self, replica: u32) -> PathBuf {
        self.chunk_dir.join(chunk_file_name(replica))
    }

    /// Resolve a raw replica id (e.g. the `CHUNK_NUM` value). Unset,
    /// unparsable, or pointing at a missing chunk falls back to the default
    /// source.
    pub fn select(&self, replica: Option<&str>) -> SelectedSource {
        let fallback = |reason: String| SelectedSource {
            path: self.default_path.clone(),
            reason,
        };
        let Some(raw) = replica.map(str::trim).filter(|r| !r.is_empty()) else {
            return fallback("no replica id set, using default source".into());
        };
        let Ok(replica) = raw.parse::<u32>() else {
            return fallback(format!("invalid replica id {raw:?}, using default source"));
        };
        let chunk = self.chunk_path(replica);
        if !chunk.is_file() {
            return fallback(format!(
                "chunk {} not found, using default source",
                chunk.display()
            ));
        }
        SelectedSource {
            path: chunk,
            reason: format!("replica {replica} using its chunk"),
        }
    }
}

pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{index}.csv")
}

/// Open a source file, gunzipping `*.gz` inputs.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        #[cfg(feature = "gzip")]
        {
            return Ok(Box::new(flate2::read::GzDecoder::new(file)));
        }
        #[cfg(not(feature = "gzip"))]
        {
            return Err(Error::Config(format!(
                "{} is gzip-compressed but the gzip feature is disabled",
                path.display()
            )));
        }
    }
    Ok(Box::new(file))
}

/// Reader builder shared by every tool that walks source files.
pub fn source_reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(SOURCE_DELIMITER)
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All);
    builder
}

/// One data line of a source. `record` failing is recoverable: the caller
/// skips the line.
#[derive(Debug)]
pub struct SourceLine {
    pub line: u64,
    pub record: Result<Measurement>,
}

/// Iterates the data lines of a source; the header and blank lines are
/// skipped. The outer `Result` carries fatal read failures.
pub struct RecordSource<R: Read> {
    reader: csv::Reader<LineTracking<R>>,
    record: StringRecord,
}

/// Remembers where newlines fall in the bytes handed to the csv reader.
///
/// The csv position of a record points at the start of any blank lines
/// skipped before it, so physical line numbers are recovered from the
/// record's end offset instead. Offsets are dropped once counted; lookups
/// must come in increasing order.
struct LineTracking<R> {
    inner: R,
    offset: u64,
    pending: VecDeque<u64>,
    counted: u64,
}

impl<R: Read> LineTracking<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            pending: VecDeque::new(),
            counted: 0,
        }
    }

    /// 1-based line holding the byte just before `end`.
    fn line_ending_at(&mut self, end: u64) -> u64 {
        let last = end.saturating_sub(1);
        while self.pending.front().is_some_and(|&nl| nl < last) {
            self.pending.pop_front();
            self.counted += 1;
        }
        self.counted + 1
    }
}

impl<R: Read> Read for LineTracking<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        for (idx, byte) in buf[..n].iter().enumerate() {
            if *byte == b'\n' {
                self.pending.push_back(self.offset + idx as u64);
            }
        }
        self.offset += n as u64;
        Ok(n)
    }
}

impl RecordSource<Box<dyn Read>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_reader(open_input(path.as_ref())?))
    }
}

impl<R: Read> RecordSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: source_reader_builder().from_reader(LineTracking::new(reader)),
            record: StringRecord::new(),
        }
    }

    /// Physical line of the record just read.
    fn current_line(&mut self) -> u64 {
        let end = self.reader.position().byte();
        self.reader.get_mut().line_ending_at(end)
    }
}

impl<R: Read> Iterator for RecordSource<R> {
    type Item = Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.current_line();
                let fields: Vec<&str> = self.record.iter().collect();
                Some(Ok(SourceLine {
                    line,
                    record: normalize_fields(&fields),
                }))
            }
            Err(err) => {
                // Undecodable text only spoils its own line.
                if !matches!(err.kind(), csv::ErrorKind::Utf8 { .. }) {
                    return Some(Err(Error::Csv(err)));
                }
                Some(Ok(SourceLine {
                    line: self.current_line(),
                    record: Err(Error::Csv(err)),
                }))
            }
        }
    }
}
