// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Owns the set of active watchers and reconciles it with the configured pairs

use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::config::WatchPair;
use crate::queue::QueueSender;
use crate::watcher::{ActiveWatch, StrategyKind, WatchStrategy};

pub struct WatcherManager {
    strategy: Box<dyn WatchStrategy>,
    queue: QueueSender,
    active: Vec<Box<dyn ActiveWatch>>,
}

impl WatcherManager {
    pub fn new(strategy: Box<dyn WatchStrategy>, queue: QueueSender) -> Self {
        Self {
            strategy,
            queue,
            active: Vec::new(),
        }
    }

    /// Replace every running watcher with one per valid pair.
    ///
    /// Returns the number of watchers started. A pair that fails to start is
    /// logged and does not affect the others.
    pub fn update_watchers(&mut self, pairs: &[WatchPair]) -> usize {
        self.stop_all();

        let mut started = HashSet::new();
        for pair in pairs {
            if !pair.is_valid() {
                warn!("Ignoring incomplete watch pair {:?}", pair);
                continue;
            }
            if !started.insert(pair.clone()) {
                continue;
            }
            if !pair.watch_folder.is_dir() {
                warn!("Watch folder {:?} does not exist, skipping", pair.watch_folder);
                continue;
            }

            match self.strategy.start(pair, self.queue.clone()) {
                Ok(watch) => self.active.push(watch),
                Err(e) => error!("Failed to watch {:?}: {}", pair.watch_folder, e),
            }
        }

        info!(
            "{} watcher(s) active ({})",
            self.active.len(),
            self.strategy.kind()
        );
        self.active.len()
    }

    /// Stop every running watcher; safe to call repeatedly
    pub fn stop_all(&mut self) {
        for watch in self.active.drain(..) {
            watch.stop();
        }
    }

    pub fn active_pairs(&self) -> Vec<WatchPair> {
        self.active.iter().map(|w| w.pair().clone()).collect()
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }
}

impl Drop for WatcherManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
