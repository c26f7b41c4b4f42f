// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Orchestrator wiring the queue, worker and watchers together

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::events::{EngineEvent, EventReceiver, EventSender};
use crate::manager::WatcherManager;
use crate::queue::{processing_queue, QueueSender};
use crate::scan::initial_scan;
use crate::watcher::{select_strategy, StrategyKind};
use crate::worker::{Worker, WorkerHandle, WorkerSettings};
use crate::{OrganizerError, Result};

pub struct Engine {
    config: AppConfig,
    queue: QueueSender,
    manager: WatcherManager,
    /// Idle worker; moved into the task while running
    worker: Option<Worker>,
    handle: Option<WorkerHandle>,
    events: EventSender,
    events_rx: Option<EventReceiver>,
}

impl Engine {
    /// Build every component without starting anything
    pub fn new(config: AppConfig) -> Self {
        let (queue, receiver) = processing_queue();
        let (events, events_rx) = mpsc::unbounded_channel();
        let manager = WatcherManager::new(select_strategy(&config.engine), queue.clone());
        let worker = Worker::new(receiver, events.clone(), WorkerSettings::from_config(&config));

        Self {
            config,
            queue,
            manager,
            worker: Some(worker),
            handle: None,
            events,
            events_rx: Some(events_rx),
        }
    }

    /// Hand out the event stream; only the first call gets it
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.manager.strategy_kind()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Scan for recent arrivals, start the worker, then the watchers
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(OrganizerError::InvalidState("engine is already running".into()));
        }

        let pairs = self.config.valid_pairs();
        if pairs.is_empty() {
            return Err(OrganizerError::Config("No watch pairs configured".into()));
        }

        let worker = self
            .worker
            .take()
            .ok_or_else(|| OrganizerError::InvalidState("worker is unavailable".into()))?;

        initial_scan(&pairs, &self.queue, self.config.engine.initial_scan_window());
        self.handle = Some(worker.spawn());

        let watching = self.manager.update_watchers(&pairs);
        if watching == 0 {
            warn!("No watch folder could be watched");
        }
        self.emit(EngineEvent::info(format!(
            "Watching {} folder(s) ({})",
            watching,
            self.manager.strategy_kind()
        )));
        Ok(())
    }

    /// Apply a new configuration's watch pairs. Worker tuning is kept.
    pub fn reload(&mut self, config: AppConfig) -> usize {
        self.config = config;
        if !self.is_running() {
            return 0;
        }

        let watching = self.manager.update_watchers(&self.config.valid_pairs());
        info!("Configuration reloaded, {} watcher(s) active", watching);
        watching
    }

    /// Stop the watchers and wait for the worker; safe to call repeatedly
    pub async fn stop(&mut self) -> Result<()> {
        self.manager.stop_all();

        if let Some(handle) = self.handle.take() {
            self.worker = Some(handle.stop().await?);
            self.emit(EngineEvent::info("Stopped watching"));
        }
        Ok(())
    }

    /// Scan once and process until nothing is pending. Returns the number
    /// of items the scan found.
    pub async fn run_once(&mut self) -> Result<usize> {
        if self.is_running() {
            return Err(OrganizerError::InvalidState("engine is already running".into()));
        }
        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| OrganizerError::InvalidState("worker is unavailable".into()))?;

        let queued = initial_scan(
            &self.config.valid_pairs(),
            &self.queue,
            self.config.engine.initial_scan_window(),
        );
        while worker.process_batch().await > 0 {}

        Ok(queued)
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
