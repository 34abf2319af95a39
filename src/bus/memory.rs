use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bus::{ChannelMessage, Partitioner, Publish, Subscribe};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    partitions: Vec<Vec<ChannelMessage>>,
    committed: HashMap<String, Vec<usize>>,
    failing_publishes: u32,
}

/// In-process topic. Handles are cheap clones sharing one log.
#[derive(Debug, Clone)]
pub struct MemoryTopic {
    partitioner: Partitioner,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTopic {
    pub fn new(partitions: u32) -> Self {
        let partitioner = Partitioner::new(partitions);
        let inner = Inner {
            partitions: vec![Vec::new(); partitioner.partitions() as usize],
            ..Inner::default()
        };
        Self {
            partitioner,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            topic: self.clone(),
        }
    }

    /// Subscriber resuming from `group`'s committed offsets.
    pub fn subscriber(&self, group: &str) -> Result<MemorySubscriber> {
        let inner = self.lock()?;
        let positions = inner
            .committed
            .get(group)
            .cloned()
            .unwrap_or_else(|| vec![0; inner.partitions.len()]);
        Ok(MemorySubscriber {
            topic: self.clone(),
            group: group.to_string(),
            positions,
            current: 0,
        })
    }

    /// Messages currently stored in `partition`.
    pub fn partition_messages(&self, partition: u32) -> Vec<ChannelMessage> {
        self.lock()
            .ok()
            .and_then(|inner| inner.partitions.get(partition as usize).cloned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock()
            .map(|inner| inner.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `count` publish calls fail without storing anything.
    pub fn fail_next_publishes(&self, count: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_publishes = count;
        }
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Transport("memory topic lock poisoned".into()))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    topic: MemoryTopic,
}

impl Publish for MemoryPublisher {
    fn publish(&mut self, batch: &[ChannelMessage]) -> Result<()> {
        let partitioner = self.topic.partitioner;
        let mut inner = self.topic.lock()?;
        if inner.failing_publishes > 0 {
            inner.failing_publishes -= 1;
            return Err(Error::Transport("injected publish failure".into()));
        }
        for msg in batch {
            let partition = partitioner.partition_for(&msg.key) as usize;
            inner.partitions[partition].push(msg.clone());
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemorySubscriber {
    topic: MemoryTopic,
    group: String,
    positions: Vec<usize>,
    current: usize,
}

impl Subscribe for MemorySubscriber {
    fn read(&mut self) -> Result<Option<ChannelMessage>> {
        let inner = self.topic.lock()?;
        while self.current < inner.partitions.len() {
            let partition = &inner.partitions[self.current];
            let position = self.positions[self.current];
            if let Some(msg) = partition.get(position) {
                self.positions[self.current] += 1;
                return Ok(Some(msg.clone()));
            }
            self.current += 1;
        }
        Ok(None)
    }

    fn commit(&mut self) -> Result<()> {
        let mut inner = self.topic.lock()?;
        inner
            .committed
            .insert(self.group.clone(), self.positions.clone());
        Ok(())
    }
}
