// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Events emitted by the engine for the orchestrator to display and persist

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Severity of an engine event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// One log line: a message plus, for completed moves, both paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub level: EventLevel,
    pub message: String,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
}

/// Sending half of the event channel
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// Receiving half of the event channel
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

impl EngineEvent {
    /// A successful relocation; the only undo-eligible kind of event
    pub fn moved(message: impl Into<String>, source: PathBuf, destination: PathBuf) -> Self {
        Self {
            level: EventLevel::Info,
            message: message.into(),
            source: Some(source),
            destination: Some(destination),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::plain(EventLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::plain(EventLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::plain(EventLevel::Error, message)
    }

    fn plain(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            source: None,
            destination: None,
        }
    }

    /// Whether the orchestrator should offer undo/redo for this event
    pub fn is_reversible(&self) -> bool {
        self.source.is_some() && self.destination.is_some()
    }
}
