// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Background worker draining the processing queue in bounded batches

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::dedup::BoundedSet;
use crate::events::{EngineEvent, EventSender};
use crate::grammar::{has_delimiter, parse_filename};
use crate::mover::MoveExecutor;
use crate::queue::{EntryKind, QueueReceiver, QueuedItem};
use crate::scan::age_of;
use crate::watcher::wait_for_stable;
use crate::{OrganizerError, Result};

/// Tuning knobs of the worker loop
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Items moved per cycle; up to twice as many are drained
    pub batch_size: usize,
    /// `None` disables age filtering
    pub max_file_age: Option<Duration>,
    /// Pause between two moves of a batch
    pub item_delay: Duration,
    /// Sleep when the queue is empty
    pub idle_delay: Duration,
    pub dedup_capacity: usize,
    pub dir_move_timeout: Duration,
    /// Gap between size samples of a file still being written
    pub stability_interval: Duration,
    /// Give up waiting for a growing file after this long
    pub stability_wait: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.engine.batch_size.max(1),
            max_file_age: config.max_file_age(),
            item_delay: config.engine.item_delay(),
            idle_delay: config.engine.idle_delay(),
            dedup_capacity: config.engine.dedup_capacity,
            dir_move_timeout: config.engine.dir_move_timeout(),
            stability_interval: config.engine.stability_interval(),
            stability_wait: config.engine.stability_wait(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Consumes queued items: filter, parse, move, report
pub struct Worker {
    queue: QueueReceiver,
    /// Drained items that did not fit in the previous batch
    backlog: Vec<QueuedItem>,
    executor: MoveExecutor,
    processed: BoundedSet<PathBuf>,
    events: EventSender,
    settings: WorkerSettings,
}

/// Running worker task
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Worker>,
}

impl WorkerHandle {
    /// Ask the worker to finish its current batch and wait for it.
    ///
    /// The worker is handed back so it can be started again.
    pub async fn stop(self) -> Result<Worker> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| OrganizerError::TaskFailed(e.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Worker {
    pub fn new(queue: QueueReceiver, events: EventSender, settings: WorkerSettings) -> Self {
        Self {
            queue,
            backlog: Vec::new(),
            executor: MoveExecutor::new(settings.dir_move_timeout),
            processed: BoundedSet::new(settings.dedup_capacity),
            events,
            settings,
        }
    }

    /// Run the loop on the tokio runtime
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle { shutdown, task }
    }

    /// Process batches until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        info!("Worker started (batch size {})", self.settings.batch_size);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.process_batch().await == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.idle_delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Worker stopped");
        self
    }

    /// Run one cycle. Returns the number of items drained, 0 when idle.
    pub async fn process_batch(&mut self) -> usize {
        let batch_size = self.settings.batch_size.max(1);
        let limit = batch_size.saturating_mul(2);

        let mut pending = std::mem::take(&mut self.backlog);
        if pending.len() < limit {
            pending.extend(self.queue.drain(limit - pending.len()));
        }
        let drained = pending.len();
        if drained == 0 {
            return 0;
        }

        let mut ready: Vec<(QueuedItem, SystemTime)> =
            pending.into_iter().filter_map(|item| self.admit(item)).collect();

        // Newest first
        ready.sort_by(|a, b| b.1.cmp(&a.1));
        if ready.len() > batch_size {
            self.backlog = ready.split_off(batch_size).into_iter().map(|(item, _)| item).collect();
            debug!("{} item(s) carried over to the next batch", self.backlog.len());
        }

        for (i, (item, _)) in ready.into_iter().enumerate() {
            if i > 0 && !self.settings.item_delay.is_zero() {
                tokio::time::sleep(self.settings.item_delay).await;
            }
            self.process_item(item).await;
        }

        drained
    }

    /// Pre-checks applied before an item is allowed into a batch
    fn admit(&self, item: QueuedItem) -> Option<(QueuedItem, SystemTime)> {
        let metadata = match fs::symlink_metadata(&item.source_path) {
            Ok(m) => m,
            Err(_) => {
                debug!("{:?} vanished, dropping", item.source_path);
                return None;
            }
        };

        if self.processed.contains(&item.source_path) {
            debug!("{:?} was already processed", item.source_path);
            return None;
        }

        if !has_delimiter(&item.filename) {
            return None;
        }

        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        if let Some(max_age) = self.settings.max_file_age {
            if age_of(modified) > max_age {
                debug!("{:?} is older than {:?}, skipping", item.source_path, max_age);
                return None;
            }
        }

        Some((item, modified))
    }

    async fn process_item(&mut self, item: QueuedItem) {
        let parsed = match parse_filename(&item.filename) {
            Ok(p) => p,
            Err(rejection) => {
                debug!("Ignoring {:?}: {}", item.filename, rejection);
                return;
            }
        };

        let is_file = fs::symlink_metadata(&item.source_path).map_or(false, |m| m.is_file());
        if is_file
            && !wait_for_stable(
                &item.source_path,
                self.settings.stability_interval,
                self.settings.stability_wait,
            )
            .await
        {
            debug!("{:?} vanished while being written", item.source_path);
            return;
        }

        let destination_dir = parsed.destination_dir(&item.target_folder);
        let result = self
            .executor
            .execute(&item.source_path, &destination_dir, &parsed.final_file_name)
            .await;

        match result {
            Ok(destination) => {
                self.processed.insert(item.source_path.clone());
                let label = match item.move_hint {
                    Some(EntryKind::Directory) => "Moved folder",
                    _ => "Moved",
                };
                self.emit(EngineEvent::moved(
                    format!("{}: {} → {}", label, item.filename, destination_dir.display()),
                    item.source_path,
                    destination,
                ));
            }
            Err(OrganizerError::SourceMissing(path)) => {
                debug!("{:?} vanished before it could be moved", path);
            }
            Err(e) if e.is_skip() => {
                warn!("Skipped {}: {}", item.filename, e);
                self.emit(EngineEvent::warning(format!("Skipped {}: {}", item.filename, e)));
            }
            Err(e @ OrganizerError::MoveTimeout { .. }) => {
                error!("{}", e);
                self.emit(EngineEvent::error(format!("Timeout: {}", e)));
            }
            Err(e) => {
                error!("Error moving {}: {}", item.filename, e);
                self.emit(EngineEvent::error(format!("Error moving {}: {}", item.filename, e)));
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("No one is listening for engine events");
        }
    }
}
