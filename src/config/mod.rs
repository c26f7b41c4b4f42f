// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for tagsort
//!
//! The engine only reads `watch_pairs`, `max_file_age_hours`, `engine` and
//! `log_file`. Every other key of the document (theme, autostart, update
//! checks, ...) belongs to the front end and is written back untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dedup;

const CONFIG_FILE_NAME: &str = ".watcher_pairs_config.json";
const LOG_FILE_NAME: &str = ".watcher_logs.jsonl";

/// A watch folder and the target root its files are organized into.
///
/// Stored in the document as a `[watch, target]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(PathBuf, PathBuf)", into = "(PathBuf, PathBuf)")]
pub struct WatchPair {
    pub watch_folder: PathBuf,
    pub target_folder: PathBuf,
}

impl WatchPair {
    pub fn new(watch_folder: impl Into<PathBuf>, target_folder: impl Into<PathBuf>) -> Self {
        Self {
            watch_folder: watch_folder.into(),
            target_folder: target_folder.into(),
        }
    }

    /// Both folders are set
    pub fn is_valid(&self) -> bool {
        !self.watch_folder.as_os_str().is_empty() && !self.target_folder.as_os_str().is_empty()
    }
}

impl From<(PathBuf, PathBuf)> for WatchPair {
    fn from((watch_folder, target_folder): (PathBuf, PathBuf)) -> Self {
        Self { watch_folder, target_folder }
    }
}

impl From<WatchPair> for (PathBuf, PathBuf) {
    fn from(pair: WatchPair) -> Self {
        (pair.watch_folder, pair.target_folder)
    }
}

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Folder pairs to organize
    #[serde(default)]
    pub watch_pairs: Vec<WatchPair>,

    /// Files older than this are left alone; 0 disables the limit
    #[serde(default = "default_max_file_age_hours")]
    pub max_file_age_hours: u64,

    /// Worker and watcher tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Activity log location
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Keys owned by the front end
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_dir_move_timeout_secs")]
    pub dir_move_timeout_secs: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_initial_scan_hours")]
    pub initial_scan_hours: u64,
    /// Skip the notification check and always poll
    #[serde(default)]
    pub force_polling: bool,
    /// Longest wait for a file to stop growing before it is moved
    #[serde(default = "default_stability_wait_ms")]
    pub stability_wait_ms: u64,
    /// Gap between two size samples of a file being written
    #[serde(default = "default_stability_interval_ms")]
    pub stability_interval_ms: u64,
}

// Default value functions
fn default_max_file_age_hours() -> u64 { 24 }
fn default_batch_size() -> usize { 10 }
fn default_item_delay_ms() -> u64 { 100 }
fn default_idle_delay_ms() -> u64 { 500 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_dir_move_timeout_secs() -> u64 { 300 }
fn default_dedup_capacity() -> usize { dedup::DEFAULT_CAPACITY }
fn default_initial_scan_hours() -> u64 { 24 }
fn default_stability_wait_ms() -> u64 { 10_000 }
fn default_stability_interval_ms() -> u64 { 500 }

fn default_log_file() -> PathBuf {
    home_dir().join(LOG_FILE_NAME)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default location of the configuration document
pub fn default_config_path() -> PathBuf {
    home_dir().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_pairs: Vec::new(),
            max_file_age_hours: default_max_file_age_hours(),
            engine: EngineConfig::default(),
            log_file: default_log_file(),
            extra: HashMap::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            item_delay_ms: default_item_delay_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            dir_move_timeout_secs: default_dir_move_timeout_secs(),
            dedup_capacity: default_dedup_capacity(),
            initial_scan_hours: default_initial_scan_hours(),
            force_polling: false,
            stability_wait_ms: default_stability_wait_ms(),
            stability_interval_ms: default_stability_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn dir_move_timeout(&self) -> Duration {
        Duration::from_secs(self.dir_move_timeout_secs)
    }

    pub fn initial_scan_window(&self) -> Duration {
        Duration::from_secs(self.initial_scan_hours.saturating_mul(3600))
    }

    pub fn stability_wait(&self) -> Duration {
        Duration::from_millis(self.stability_wait_ms)
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms.max(1))
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::OrganizerError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Age limit for processed files, `None` when disabled
    pub fn max_file_age(&self) -> Option<Duration> {
        match self.max_file_age_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours.saturating_mul(3600))),
        }
    }

    /// Activity log path with `~` expanded
    pub fn log_path(&self) -> PathBuf {
        expand_home(&self.log_file)
    }

    /// Pairs with both folders set, `~` expanded
    pub fn valid_pairs(&self) -> Vec<WatchPair> {
        self.watch_pairs
            .iter()
            .filter(|pair| pair.is_valid())
            .map(|pair| WatchPair::new(expand_home(&pair.watch_folder), expand_home(&pair.target_folder)))
            .collect()
    }

    /// Human-readable problems with the configuration; empty when fine
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.watch_pairs.is_empty() {
            problems.push("No watch pairs configured".to_string());
        }

        for (i, pair) in self.watch_pairs.iter().enumerate() {
            if !pair.is_valid() {
                problems.push(format!("Pair {} has an empty folder", i + 1));
                continue;
            }
            if !expand_home(&pair.watch_folder).is_dir() {
                problems.push(format!("Watch folder {:?} does not exist", pair.watch_folder));
            }
            for other in &self.watch_pairs[i + 1..] {
                if other.watch_folder == pair.watch_folder && other.target_folder != pair.target_folder {
                    problems.push(format!(
                        "Watch folder {:?} has conflicting targets {:?} and {:?}",
                        pair.watch_folder, pair.target_folder, other.target_folder
                    ));
                }
            }
        }

        if self.engine.batch_size == 0 {
            problems.push("engine.batch_size must be at least 1".to_string());
        }

        problems
    }
}
