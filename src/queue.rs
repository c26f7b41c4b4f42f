// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Thread-safe FIFO between the producers (watchers, poller, initial scan) and the worker

use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::config::WatchPair;

/// Kind of filesystem entry observed when an item was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A discovered candidate waiting to be organized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    pub filename: String,
    pub source_path: PathBuf,
    pub watch_folder: PathBuf,
    pub target_folder: PathBuf,
    pub move_hint: Option<EntryKind>,
}

impl QueuedItem {
    /// Build an item for `path` inside `pair`'s watch folder
    pub fn new(path: &Path, pair: &WatchPair) -> Option<Self> {
        let filename = path.file_name()?.to_str()?.to_string();
        Some(Self {
            filename,
            source_path: path.to_path_buf(),
            watch_folder: pair.watch_folder.clone(),
            target_folder: pair.target_folder.clone(),
            move_hint: None,
        })
    }

    pub fn with_hint(mut self, kind: EntryKind) -> Self {
        self.move_hint = Some(kind);
        self
    }
}

/// Producer handle; cheap to clone and usable from any thread
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<QueuedItem>,
}

/// Consumer handle owned by the worker
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<QueuedItem>,
}

/// Create the processing queue
pub fn processing_queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

impl QueueSender {
    /// Push an item; returns `false` once the worker side is gone
    pub fn enqueue(&self, item: QueuedItem) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReceiver {
    /// Take up to `max` items without waiting
    pub fn drain(&mut self, max: usize) -> Vec<QueuedItem> {
        let mut items = Vec::new();
        while items.len() < max {
            match self.rx.try_recv() {
                Ok(item) => items.push(item),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> WatchPair {
        WatchPair::new("/watch", "/target")
    }

    #[test]
    fn test_fifo_drain_is_bounded() {
        let (tx, mut rx) = processing_queue();
        for name in ["a, 1", "b, 2", "c, 3"] {
            let item = QueuedItem::new(&Path::new("/watch").join(name), &pair()).unwrap();
            assert!(tx.enqueue(item));
        }

        let first = rx.drain(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].filename, "a, 1");
        assert_eq!(first[1].filename, "b, 2");

        let rest = rx.drain(10);
        assert_eq!(rest.len(), 1);
        assert!(rx.drain(10).is_empty());
    }

    #[test]
    fn test_enqueue_from_other_thread() {
        let (tx, mut rx) = processing_queue();
        let item = QueuedItem::new(Path::new("/watch/x, y.txt"), &pair())
            .unwrap()
            .with_hint(EntryKind::File);

        std::thread::spawn(move || tx.enqueue(item)).join().unwrap();

        let items = rx.drain(5);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].target_folder, PathBuf::from("/target"));
        assert_eq!(items[0].move_hint, Some(EntryKind::File));
    }
}
