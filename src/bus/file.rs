//! Directory-backed topic.
//!
//! ```text
//! <root>/<topic>/topic.json              partition count
//! <root>/<topic>/partition-000.log       framed messages, append-only
//! <root>/<topic>/_groups/<group>.json    committed byte offsets per partition
//! ```
//!
//! Frame layout (little-endian):
//!
//! ```text
//! ┌──────────┬───────────┬────────────┬──────────┬─────┬───────┐
//! │ key_len  │ value_len │ header_crc │ body_crc │ key │ value │
//! │   u32    │    u32    │    u32     │   u32    │     │       │
//! └──────────┴───────────┴────────────┴──────────┴─────┴───────┘
//! ```
//!
//! `header_crc` covers the two length words, `body_crc` covers key and value.
//! Lengths are checked before the body is read, so a damaged header is
//! reported as corruption instead of being mistaken for the end of the log.
//! A frame cut short at the end of a partition is treated as not yet written.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bus::{ChannelMessage, Partitioner, Publish, Subscribe};
use crate::{Error, Result};

const FRAME_HEADER_LEN: usize = 16;
/// Largest key plus value a frame may carry.
pub const MAX_FRAME_BODY: usize = 16 * 1024 * 1024;
const TOPIC_META: &str = "topic.json";
const GROUPS_DIR: &str = "_groups";

#[derive(Debug, Serialize, Deserialize)]
struct TopicMeta {
    partitions: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GroupOffsets {
    offsets: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct FileTopic {
    dir: PathBuf,
    partitioner: Partitioner,
    max_attempts: u32,
}

impl FileTopic {
    /// Open `topic` under `root`, creating it with `partitions` partitions if
    /// it does not exist. Reopening with a different count is an error.
    pub fn open(root: impl AsRef<Path>, topic: &str, partitions: u32) -> Result<Self> {
        validate_name("topic", topic)?;
        let dir = root.as_ref().join(topic);
        fs::create_dir_all(dir.join(GROUPS_DIR))?;

        let meta_path = dir.join(TOPIC_META);
        let partitioner = match fs::read_to_string(&meta_path) {
            Ok(data) => {
                let meta: TopicMeta = serde_json::from_str(&data)?;
                if meta.partitions != partitions {
                    return Err(Error::Config(format!(
                        "topic {topic} has {} partitions, requested {partitions}",
                        meta.partitions
                    )));
                }
                Partitioner::new(meta.partitions)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let partitioner = Partitioner::new(partitions);
                let meta = TopicMeta {
                    partitions: partitioner.partitions(),
                };
                fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)?;
                partitioner
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            dir,
            partitioner,
            max_attempts: 3,
        })
    }

    /// Attempts per partition append before a publish fails.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    pub fn publisher(&self) -> FilePublisher {
        FilePublisher {
            topic: self.clone(),
        }
    }

    /// Subscriber resuming from `group`'s committed offsets.
    pub fn subscriber(&self, group: &str) -> Result<FileSubscriber> {
        validate_name("consumer group", group)?;
        let path = self.group_path(group);
        let mut offsets = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str::<GroupOffsets>(&data)?.offsets,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        offsets.resize(self.partitioner.partitions() as usize, 0);

        Ok(FileSubscriber {
            topic: self.clone(),
            group_path: path,
            offsets,
            current: 0,
            reader: None,
        })
    }

    fn partition_path(&self, partition: u32) -> PathBuf {
        self.dir.join(format!("partition-{partition:03}.log"))
    }

    fn group_path(&self, group: &str) -> PathBuf {
        self.dir.join(GROUPS_DIR).join(format!("{group}.json"))
    }

    fn append_partition(&self, partition: u32, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.partition_path(partition))?;
        let start = file.metadata()?.len();
        let written = file.write_all(bytes).and_then(|_| file.sync_data());
        if written.is_err() {
            // Drop a torn frame so readers never see half a batch tail.
            let _ = file.set_len(start);
        }
        written
    }
}

#[derive(Debug, Clone)]
pub struct FilePublisher {
    topic: FileTopic,
}

impl Publish for FilePublisher {
    fn publish(&mut self, batch: &[ChannelMessage]) -> Result<()> {
        let partitions = self.topic.partitioner.partitions() as usize;
        let mut buffers: Vec<Vec<u8>> = vec![Vec::new(); partitions];
        for msg in batch {
            let partition = self.topic.partitioner.partition_for(&msg.key) as usize;
            encode_frame(&mut buffers[partition], msg)?;
        }

        for (partition, bytes) in buffers.iter().enumerate() {
            if bytes.is_empty() {
                continue;
            }
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.topic.append_partition(partition as u32, bytes) {
                    Ok(()) => break,
                    Err(err) if attempt < self.topic.max_attempts => {
                        log::debug!("append to partition {partition} failed (attempt {attempt}): {err}");
                    }
                    Err(err) => {
                        return Err(Error::Transport(format!(
                            "append to partition {partition} failed after {attempt} attempts: {err}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileSubscriber {
    topic: FileTopic,
    group_path: PathBuf,
    offsets: Vec<u64>,
    current: usize,
    reader: Option<BufReader<File>>,
}

impl FileSubscriber {
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    fn open_current(&mut self) -> Result<bool> {
        let path = self.topic.partition_path(self.current as u32);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(Error::Transport(format!("{}: {err}", path.display()))),
        };
        file.seek(SeekFrom::Start(self.offsets[self.current]))
            .map_err(|err| Error::Transport(err.to_string()))?;
        self.reader = Some(BufReader::new(file));
        Ok(true)
    }
}

impl Subscribe for FileSubscriber {
    fn read(&mut self) -> Result<Option<ChannelMessage>> {
        while self.current < self.offsets.len() {
            if self.reader.is_none() && !self.open_current()? {
                self.current += 1;
                continue;
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };
            match decode_frame(reader)? {
                Some((msg, frame_len)) => {
                    self.offsets[self.current] += frame_len;
                    return Ok(Some(msg));
                }
                None => {
                    self.reader = None;
                    self.current += 1;
                }
            }
        }
        Ok(None)
    }

    fn commit(&mut self) -> Result<()> {
        let offsets = GroupOffsets {
            offsets: self.offsets.clone(),
        };
        let tmp = self.group_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&offsets)?)
            .and_then(|_| fs::rename(&tmp, &self.group_path))
            .map_err(|err| Error::Transport(format!("commit offsets: {err}")))
    }
}

fn encode_frame(buf: &mut Vec<u8>, msg: &ChannelMessage) -> Result<()> {
    let key = msg.key.as_bytes();
    if key.len() + msg.value.len() > MAX_FRAME_BODY {
        return Err(Error::Transport(format!(
            "message of {} bytes exceeds the {MAX_FRAME_BODY} byte frame limit",
            key.len() + msg.value.len()
        )));
    }
    let mut lengths = [0u8; 8];
    lengths[..4].copy_from_slice(&(key.len() as u32).to_le_bytes());
    lengths[4..].copy_from_slice(&(msg.value.len() as u32).to_le_bytes());
    let mut body_crc = crc32fast::Hasher::new();
    body_crc.update(key);
    body_crc.update(&msg.value);

    buf.extend_from_slice(&lengths);
    buf.extend_from_slice(&crc32fast::hash(&lengths).to_le_bytes());
    buf.extend_from_slice(&body_crc.finalize().to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&msg.value);
    Ok(())
}

/// Next frame and its encoded length, or `None` at a clean or torn end.
fn decode_frame(reader: &mut impl Read) -> Result<Option<(ChannelMessage, u64)>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    if !read_full(reader, &mut header)? {
        return Ok(None);
    }
    let word = |idx: usize| {
        u32::from_le_bytes([
            header[idx],
            header[idx + 1],
            header[idx + 2],
            header[idx + 3],
        ])
    };
    if crc32fast::hash(&header[..8]) != word(8) {
        return Err(Error::Transport("corrupt frame: header checksum mismatch".into()));
    }
    let key_len = word(0) as usize;
    let value_len = word(4) as usize;
    if key_len + value_len > MAX_FRAME_BODY {
        return Err(Error::Transport(format!(
            "corrupt frame: body of {} bytes exceeds the frame limit",
            key_len + value_len
        )));
    }

    let mut body = vec![0u8; key_len + value_len];
    if !read_full(reader, &mut body)? {
        return Ok(None);
    }
    if crc32fast::hash(&body) != word(12) {
        return Err(Error::Transport("corrupt frame: body checksum mismatch".into()));
    }
    let value = body.split_off(key_len);
    let key = String::from_utf8(body)
        .map_err(|_| Error::Transport("corrupt frame: key is not utf-8".into()))?;
    let frame_len = (FRAME_HEADER_LEN + key_len + value_len) as u64;
    Ok(Some((ChannelMessage { key, value }, frame_len)))
}

/// Fill `buf` completely; `false` if the stream ended first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(Error::Transport(err.to_string())),
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
    {
        return Err(Error::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
