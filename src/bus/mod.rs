//! Partitioned message channel.
//!
//! A topic has a fixed number of partitions. Publishers choose a partition
//! from each message key, so every message for one sensor lands in one
//! partition and keeps its publish order there. Subscribers belong to a
//! named group and acknowledge progress with [`Subscribe::commit`].
//!
//! ```text
//! Publisher ──key──► Partitioner ──► partition-0 ─┐
//!                                 ──► partition-1 ─┼──► Subscriber (group)
//!                                 ──► partition-2 ─┘
//! ```
//!
//! Delivery is at-least-once: anything read after the last commit is read
//! again by the next subscriber of the same group.

mod file;
mod memory;

pub use file::FileTopic;
pub use memory::{MemoryPublisher, MemorySubscriber, MemoryTopic};

use crate::Result;

/// One serialized record plus its affinity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub key: String,
    pub value: Vec<u8>,
}

impl ChannelMessage {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub trait Publish {
    /// Deliver a whole batch. An error means the batch as a whole failed;
    /// callers do not retry individual messages.
    fn publish(&mut self, batch: &[ChannelMessage]) -> Result<()>;
}

pub trait Subscribe {
    /// Next message, `Ok(None)` once the channel is exhausted.
    fn read(&mut self) -> Result<Option<ChannelMessage>>;

    /// Acknowledge everything read so far.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: Publish + ?Sized> Publish for &mut P {
    fn publish(&mut self, batch: &[ChannelMessage]) -> Result<()> {
        (**self).publish(batch)
    }
}

impl<S: Subscribe + ?Sized> Subscribe for &mut S {
    fn read(&mut self) -> Result<Option<ChannelMessage>> {
        (**self).read()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}

/// Stable key-to-partition mapping: CRC-32 of the key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    partitions: u32,
}

impl Partitioner {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn partition_for(&self, key: &str) -> u32 {
        crc32fast::hash(key.as_bytes()) % self.partitions
    }
}
