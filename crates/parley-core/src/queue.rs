//! Durable per-peer outbox.
//!
//! Messages for a peer without an established session wait here until one
//! comes up. Each peer's queue is one JSON array in
//! `<data_dir>/queue/<fingerprint>.json`, rewritten on every change.
//!
//! # Invariants
//!
//! - Entries leave a queue in the order they entered it.
//! - After `flush` returns, the queue is empty on disk and in memory; entries
//!   that then fail to send come back through `requeue_front`, ahead of
//!   anything enqueued since.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fs,
    path::{Path, PathBuf},
};

use parley_proto::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::store;

/// Directory holding the per-peer queue files.
pub const QUEUE_DIR: &str = "queue";

/// One undelivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Recipient.
    pub destination: Fingerprint,
    /// Message text.
    pub text: String,
    /// Stream the message should go out on.
    #[serde(default)]
    pub stream_id: u16,
    /// Unix seconds when the message was queued.
    pub enqueued_at: u64,
    /// Free-form annotations carried with the message.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Queues for all peers.
#[derive(Debug, Default)]
pub struct MessageQueue {
    dir: Option<PathBuf>,
    queues: HashMap<Fingerprint, VecDeque<QueueEntry>>,
}

impl MessageQueue {
    /// Queue that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open `<data_dir>/queue/`, loading every `<fingerprint>.json` in it.
    ///
    /// Files with names that are not fingerprints are ignored; corrupt files
    /// load as empty.
    pub fn open(data_dir: &Path) -> Self {
        let dir = data_dir.join(QUEUE_DIR);
        let mut queues = HashMap::new();

        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_none_or(|ext| ext != "json") {
                        continue;
                    }
                    let Some(fingerprint) = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| Fingerprint::parse(s).ok())
                    else {
                        continue;
                    };
                    let entries: VecDeque<QueueEntry> = store::load_or_default(&path);
                    if !entries.is_empty() {
                        queues.insert(fingerprint, entries);
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "cannot read queue dir"),
        }

        let total: usize = queues.values().map(VecDeque::len).sum();
        if total > 0 {
            tracing::info!(peers = queues.len(), messages = total, "loaded queued messages");
        }

        Self { dir: Some(dir), queues }
    }

    /// Append a message for `destination`. Returns the new queue length.
    pub fn enqueue(
        &mut self,
        destination: Fingerprint,
        text: &str,
        stream_id: u16,
        metadata: BTreeMap<String, String>,
        now_unix: u64,
    ) -> usize {
        let queue = self.queues.entry(destination).or_default();
        queue.push_back(QueueEntry {
            destination,
            text: text.to_owned(),
            stream_id,
            enqueued_at: now_unix,
            metadata,
        });
        let len = queue.len();
        self.persist(destination);
        len
    }

    /// Take every queued message for `destination`, oldest first.
    pub fn flush(&mut self, destination: Fingerprint) -> Vec<QueueEntry> {
        let Some(queue) = self.queues.remove(&destination) else {
            return Vec::new();
        };
        self.persist(destination);
        queue.into()
    }

    /// Put failed entries back at the head, keeping their order.
    pub fn requeue_front(&mut self, destination: Fingerprint, entries: Vec<QueueEntry>) {
        if entries.is_empty() {
            return;
        }
        let queue = self.queues.entry(destination).or_default();
        for entry in entries.into_iter().rev() {
            queue.push_front(entry);
        }
        self.persist(destination);
    }

    /// Drop every queued message for `destination`.
    pub fn clear(&mut self, destination: Fingerprint) {
        if self.queues.remove(&destination).is_some() {
            self.persist(destination);
        }
    }

    /// Number of messages waiting for `destination`.
    pub fn len(&self, destination: &Fingerprint) -> usize {
        self.queues.get(destination).map_or(0, VecDeque::len)
    }

    /// True if nothing is queued for `destination`.
    pub fn is_empty(&self, destination: &Fingerprint) -> bool {
        self.len(destination) == 0
    }

    /// Pending counts for every non-empty queue.
    pub fn pending(&self) -> BTreeMap<Fingerprint, usize> {
        self.queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(fp, q)| (*fp, q.len()))
            .collect()
    }

    fn persist(&self, destination: Fingerprint) {
        let Some(dir) = &self.dir else { return };
        let path = dir.join(format!("{destination}.json"));
        let result = match self.queues.get(&destination) {
            Some(queue) if !queue.is_empty() => store::write_atomic(&path, queue),
            _ => store::remove(&path),
        };
        if let Err(e) = result {
            tracing::error!(fingerprint = %destination, error = %e, "failed to persist queue");
        }
    }
}
