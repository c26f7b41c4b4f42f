// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Directory listing and the one-shot startup scan

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::config::WatchPair;
use crate::queue::{EntryKind, QueueSender, QueuedItem};
use crate::watcher::is_candidate;
use crate::Result;

/// A directory entry that may be organized
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub kind: EntryKind,
}

impl Candidate {
    pub fn to_item(&self, pair: &WatchPair) -> Option<QueuedItem> {
        QueuedItem::new(&self.path, pair).map(|item| item.with_hint(self.kind))
    }
}

/// List the entries of `folder` that pass the candidate pre-check
pub fn list_candidates(folder: &Path) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for entry in fs::read_dir(folder)?.flatten() {
        let path = entry.path();
        if !is_candidate(&path) {
            continue;
        }
        // Entries can vanish between listing and stat
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        candidates.push(Candidate { path, modified, kind });
    }

    Ok(candidates)
}

/// Age of a modification time; timestamps in the future count as brand new
pub fn age_of(modified: SystemTime) -> Duration {
    SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO)
}

/// Enqueue everything modified within `window` across all pairs, newest first.
///
/// Catches files that arrived while the engine was not running.
pub fn initial_scan(pairs: &[WatchPair], queue: &QueueSender, window: Duration) -> usize {
    let mut found: Vec<(Candidate, &WatchPair)> = Vec::new();

    for pair in pairs {
        match list_candidates(&pair.watch_folder) {
            Ok(candidates) => {
                found.extend(
                    candidates
                        .into_iter()
                        .filter(|c| age_of(c.modified) <= window)
                        .map(|c| (c, pair)),
                );
            }
            Err(e) => warn!("Cannot scan {:?}: {}", pair.watch_folder, e),
        }
    }

    found.sort_by(|a, b| b.0.modified.cmp(&a.0.modified));

    let mut queued = 0;
    for (candidate, pair) in &found {
        if let Some(item) = candidate.to_item(pair) {
            if queue.enqueue(item) {
                queued += 1;
            }
        }
    }

    if queued > 0 {
        info!("Initial scan queued {} item(s)", queued);
    } else {
        debug!("Initial scan found nothing to organize");
    }
    queued
}
