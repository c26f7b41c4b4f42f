// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watchers for monitoring watch folders
//!
//! Two interchangeable strategies feed the processing queue: OS change
//! notifications through `notify`, or a fixed-interval directory listing when
//! notifications are unavailable. The choice is made once at startup.

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, WatchPair};
use crate::dedup::BoundedSet;
use crate::grammar::has_delimiter;
use crate::queue::{EntryKind, QueueSender, QueuedItem};
use crate::scan::{list_candidates, Candidate};
use crate::{OrganizerError, Result};

/// Which strategy is feeding the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Event,
    Polling,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "event-driven"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// Starts one watcher per watch pair
pub trait WatchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Begin watching `pair.watch_folder`, pushing candidates onto `queue`
    fn start(&self, pair: &WatchPair, queue: QueueSender) -> Result<Box<dyn ActiveWatch>>;
}

/// A running watcher. Stopping releases its OS subscription or timer, and
/// nothing is enqueued by it once `stop` has returned.
pub trait ActiveWatch: Send {
    fn pair(&self) -> &WatchPair;

    fn stop(self: Box<Self>);
}

/// Pick the strategy for this process, once, by checking the notification backend
pub fn select_strategy(config: &EngineConfig) -> Box<dyn WatchStrategy> {
    let polling = PollStrategy::new(config.poll_interval(), config.dedup_capacity);

    if config.force_polling {
        info!("Polling forced by configuration");
        return Box::new(polling);
    }

    if EventStrategy::is_available() {
        Box::new(EventStrategy::new(config.dedup_capacity))
    } else {
        warn!(
            "File system notifications unavailable, polling every {:?}",
            config.poll_interval()
        );
        Box::new(polling)
    }
}

/// OS notification strategy
pub struct EventStrategy {
    dedup_capacity: usize,
}

impl EventStrategy {
    pub fn new(dedup_capacity: usize) -> Self {
        Self { dedup_capacity }
    }

    /// Whether the platform notification backend can be created
    pub fn is_available() -> bool {
        match RecommendedWatcher::new(|_: notify::Result<Event>| {}, Config::default()) {
            Ok(_) => true,
            Err(e) => {
                warn!("Notification backend unavailable: {}", e);
                false
            }
        }
    }
}

impl WatchStrategy for EventStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Event
    }

    fn start(&self, pair: &WatchPair, queue: QueueSender) -> Result<Box<dyn ActiveWatch>> {
        let folder = pair.watch_folder.clone();
        // Backends may report resolved paths (e.g. /private/var for /var)
        let resolved = fs::canonicalize(&folder).unwrap_or_else(|_| folder.clone());
        let callback_pair = pair.clone();
        let mut seen: BoundedSet<(PathBuf, SystemTime)> = BoundedSet::new(self.dedup_capacity);
        let (shutdown, stopped) = watch::channel(false);

        // Runs on notify's thread: it owns its dedup set and only enqueues
        let handler = move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Watch error on {:?}: {}", folder, e);
                    return;
                }
            };

            // Held while enqueueing so `stop` waits for this callback
            let halted = stopped.borrow();
            if *halted {
                return;
            }

            for path in candidate_paths(&event, &[folder.as_path(), resolved.as_path()]) {
                let Ok(metadata) = fs::metadata(&path) else {
                    continue;
                };
                let Ok(modified) = metadata.modified() else {
                    continue;
                };
                if !seen.insert((path.clone(), modified)) {
                    continue;
                }
                let kind = if metadata.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                if let Some(item) = QueuedItem::new(&path, &callback_pair) {
                    debug!("Queued {:?}", path);
                    queue.enqueue(item.with_hint(kind));
                }
            }
        };

        let mut watcher = RecommendedWatcher::new(handler, Config::default())?;
        watcher.watch(&pair.watch_folder, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", pair.watch_folder);

        Ok(Box::new(EventWatch {
            pair: pair.clone(),
            shutdown,
            watcher,
        }))
    }
}

struct EventWatch {
    pair: WatchPair,
    shutdown: watch::Sender<bool>,
    watcher: RecommendedWatcher,
}

impl ActiveWatch for EventWatch {
    fn pair(&self) -> &WatchPair {
        &self.pair
    }

    fn stop(mut self: Box<Self>) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.watcher.unwatch(&self.pair.watch_folder) {
            debug!("Unwatch {:?}: {}", self.pair.watch_folder, e);
        }
        info!("Stopped watching: {:?}", self.pair.watch_folder);
    }
}

/// Paths of an event that may have to be organized: created, modified, or
/// renamed into one of `folders` itself. `folders` are spellings of the
/// same watch folder.
pub fn candidate_paths(event: &Event, folders: &[&Path]) -> Vec<PathBuf> {
    let relevant = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    if !relevant {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|p| {
            p.parent()
                .map_or(false, |parent| folders.iter().any(|f| *f == parent))
                && is_candidate(p)
        })
        .cloned()
        .collect()
}

/// Fixed-interval listing strategy
pub struct PollStrategy {
    interval: Duration,
    dedup_capacity: usize,
}

impl PollStrategy {
    pub fn new(interval: Duration, dedup_capacity: usize) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            dedup_capacity,
        }
    }
}

impl WatchStrategy for PollStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Polling
    }

    fn start(&self, pair: &WatchPair, queue: QueueSender) -> Result<Box<dyn ActiveWatch>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OrganizerError::Runtime(e.to_string()))?;
        let (shutdown, stopped) = watch::channel(false);
        let task = runtime.spawn(poll_folder(
            pair.clone(),
            queue,
            self.interval,
            self.dedup_capacity,
            stopped,
        ));
        info!("Polling: {:?} every {:?}", pair.watch_folder, self.interval);

        Ok(Box::new(PollWatch {
            pair: pair.clone(),
            shutdown,
            task,
        }))
    }
}

struct PollWatch {
    pair: WatchPair,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ActiveWatch for PollWatch {
    fn pair(&self) -> &WatchPair {
        &self.pair
    }

    fn stop(self: Box<Self>) {
        // Blocks until a listing in progress has finished enqueueing
        self.shutdown.send_replace(true);
        self.task.abort();
        info!("Stopped polling: {:?}", self.pair.watch_folder);
    }
}

async fn poll_folder(
    pair: WatchPair,
    queue: QueueSender,
    interval: Duration,
    capacity: usize,
    mut stopped: watch::Receiver<bool>,
) {
    let mut seen: BoundedSet<(PathBuf, SystemTime)> = BoundedSet::new(capacity);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped.changed() => return,
        }

        let candidates = match list_candidates(&pair.watch_folder) {
            Ok(c) => c,
            Err(e) => {
                debug!("Cannot list {:?}: {}", pair.watch_folder, e);
                continue;
            }
        };

        if !enqueue_unseen(&pair, &queue, candidates, &mut seen, &stopped) {
            return;
        }
    }
}

/// Queue candidates not seen before. Returns false once polling must end.
fn enqueue_unseen(
    pair: &WatchPair,
    queue: &QueueSender,
    candidates: Vec<Candidate>,
    seen: &mut BoundedSet<(PathBuf, SystemTime)>,
    stopped: &watch::Receiver<bool>,
) -> bool {
    // Held while enqueueing so `stop` waits for this listing
    let halted = stopped.borrow();
    if *halted {
        return false;
    }

    for candidate in candidates {
        if !seen.insert((candidate.path.clone(), candidate.modified)) {
            continue;
        }
        if let Some(item) = candidate.to_item(pair) {
            if !queue.enqueue(item) {
                debug!("Queue closed, polling of {:?} ends", pair.watch_folder);
                return false;
            }
        }
    }
    true
}

/// Wait until a file stops growing.
///
/// Returns false if it vanished meanwhile. Gives up waiting after `max_wait`
/// and lets the caller proceed.
pub async fn wait_for_stable(path: &Path, interval: Duration, max_wait: Duration) -> bool {
    let start = Instant::now();

    let mut last_size = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(interval).await;

        let current_size = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false,
        };

        if current_size == last_size {
            return true;
        }

        if start.elapsed() > max_wait {
            warn!("File stability check timed out for {:?}", path);
            return true;
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}

/// Check if a path is worth queueing: not hidden, temporary or a system
/// file, and carrying the comma delimiter of the naming grammar
pub fn is_candidate(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    should_process(filename) && has_delimiter(filename)
}

fn should_process(filename: &str) -> bool {
    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip temporary files
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    !skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::processing_queue;
    use notify::event::{CreateKind, RemoveKind};
    use tempfile::TempDir;

    #[test]
    fn test_is_candidate() {
        assert!(is_candidate(Path::new("/w/Docs, Report.pdf")));
        assert!(!is_candidate(Path::new("/w/Report.pdf")));
        assert!(!is_candidate(Path::new("/w/.Docs, Report.pdf")));
        assert!(!is_candidate(Path::new("/w/Docs, Report.pdf.crdownload")));
        assert!(!is_candidate(Path::new("/w/Docs, Report.part")));
    }

    #[test]
    fn test_candidate_paths_from_events() {
        let folder: &[&Path] = &[Path::new("/w")];
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/w/Docs, a.pdf"));
        assert_eq!(
            candidate_paths(&created, folder),
            vec![PathBuf::from("/w/Docs, a.pdf")]
        );

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/elsewhere/a.pdf"))
            .add_path(PathBuf::from("/w/Docs, a.pdf"));
        assert_eq!(
            candidate_paths(&renamed, folder),
            vec![PathBuf::from("/w/Docs, a.pdf")]
        );

        let nested = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/w/sub/Docs, a.pdf"));
        assert!(candidate_paths(&nested, folder).is_empty());

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/w/Docs, a.pdf"));
        assert!(candidate_paths(&removed, folder).is_empty());

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/w/Docs, a.pdf"));
        assert!(candidate_paths(&moved_out, folder).is_empty());
    }

    #[test]
    fn test_candidate_paths_accept_resolved_folder() {
        let folders: &[&Path] = &[Path::new("/var/w"), Path::new("/private/var/w")];
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/private/var/w/Docs, a.pdf"));
        assert_eq!(
            candidate_paths(&created, folders),
            vec![PathBuf::from("/private/var/w/Docs, a.pdf")]
        );

        let other = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/private/var/x/Docs, a.pdf"));
        assert!(candidate_paths(&other, folders).is_empty());
    }

    async fn drain_until_some(rx: &mut crate::queue::QueueReceiver) -> Vec<QueuedItem> {
        let mut items = Vec::new();
        for _ in 0..250 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            items.extend(rx.drain(10));
            if !items.is_empty() {
                break;
            }
        }
        items
    }

    fn drop_in(watch: &Path, name: &str) {
        // Renamed in whole so no watcher sees a half-written file
        let staging = TempDir::new_in(watch.parent().unwrap()).unwrap();
        fs::write(staging.path().join("staged"), b"a").unwrap();
        fs::rename(staging.path().join("staged"), watch.join(name)).unwrap();
    }

    #[tokio::test]
    async fn test_event_strategy_enqueues_and_stops() {
        if !EventStrategy::is_available() {
            return;
        }
        let watch = TempDir::new().unwrap();
        let pair = WatchPair::new(watch.path(), "/target");
        let (tx, mut rx) = processing_queue();

        let strategy = EventStrategy::new(100);
        assert_eq!(strategy.kind(), StrategyKind::Event);
        let active = strategy.start(&pair, tx).unwrap();
        assert_eq!(active.pair(), &pair);

        drop_in(watch.path(), "Docs, a.pdf");
        fs::write(watch.path().join("ignored.pdf"), b"b").unwrap();

        let mut items = drain_until_some(&mut rx).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        items.extend(rx.drain(10));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].filename, "Docs, a.pdf");
        assert_eq!(items[0].move_hint, Some(EntryKind::File));
        assert_eq!(items[0].target_folder, PathBuf::from("/target"));

        active.stop();
        drop_in(watch.path(), "Docs, b.pdf");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.drain(10).is_empty());
    }

    #[tokio::test]
    async fn test_stopped_poller_enqueues_nothing() {
        let watch = TempDir::new().unwrap();
        let pair = WatchPair::new(watch.path(), "/target");
        let (tx, mut rx) = processing_queue();

        let active = PollStrategy::new(Duration::from_millis(5), 100)
            .start(&pair, tx)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        active.stop();

        drop_in(watch.path(), "Docs, a.pdf");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.drain(10).is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_stable_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Docs, gone.pdf");
        let interval = Duration::from_millis(10);
        assert!(!wait_for_stable(&path, interval, Duration::from_secs(1)).await);

        fs::write(&path, b"a").unwrap();
        let remover = {
            let path = path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                fs::remove_file(path).unwrap();
            })
        };
        assert!(!wait_for_stable(&path, Duration::from_millis(100), Duration::from_secs(1)).await);
        remover.join().unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_stable_waits_for_writer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Docs, big.bin");
        fs::write(&path, b"").unwrap();

        let writer = {
            let path = path.clone();
            std::thread::spawn(move || {
                use std::io::Write;
                let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
                for _ in 0..60 {
                    file.write_all(&[0u8; 64]).unwrap();
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let started = Instant::now();
        assert!(wait_for_stable(&path, Duration::from_millis(60), Duration::from_secs(5)).await);
        assert!(started.elapsed() >= Duration::from_millis(120));
        writer.join().unwrap();

        // A file at rest is stable after one interval
        let started = Instant::now();
        assert!(wait_for_stable(&path, Duration::from_millis(10), Duration::from_secs(5)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_poll_strategy_enqueues_new_files_once() {
        let watch = TempDir::new().unwrap();
        let pair = WatchPair::new(watch.path(), "/target");
        let (tx, mut rx) = processing_queue();

        let strategy = PollStrategy::new(Duration::from_millis(20), 100);
        assert_eq!(strategy.kind(), StrategyKind::Polling);
        let active = strategy.start(&pair, tx).unwrap();

        // Renamed in whole so the poller never sees a half-written file
        let staging = TempDir::new_in(watch.path().parent().unwrap()).unwrap();
        fs::write(staging.path().join("a.pdf"), b"a").unwrap();
        fs::rename(staging.path().join("a.pdf"), watch.path().join("Docs, a.pdf")).unwrap();
        fs::write(watch.path().join("ignored.pdf"), b"b").unwrap();

        let mut items = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            items.extend(rx.drain(10));
            if !items.is_empty() {
                break;
            }
        }
        // A few more ticks must not produce duplicates
        tokio::time::sleep(Duration::from_millis(100)).await;
        items.extend(rx.drain(10));
        active.stop();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].filename, "Docs, a.pdf");
        assert_eq!(items[0].move_hint, Some(EntryKind::File));
    }

    #[test]
    fn test_polling_needs_a_runtime() {
        let (tx, _rx) = processing_queue();
        let result = PollStrategy::new(Duration::from_secs(1), 10)
            .start(&WatchPair::new("/w", "/t"), tx);
        assert!(matches!(result, Err(OrganizerError::Runtime(_))));
    }

    #[test]
    fn test_forced_polling() {
        let config = EngineConfig {
            force_polling: true,
            ..EngineConfig::default()
        };
        assert_eq!(select_strategy(&config).kind(), StrategyKind::Polling);
    }
}
