// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for tagsort

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::grammar::Rejection;

/// Result type alias for tagsort operations
pub type Result<T> = std::result::Result<T, OrganizerError>;

/// tagsort error types
#[derive(Error, Debug)]
pub enum OrganizerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Filename rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Source no longer exists: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("{} already exists", .0.display())]
    DestinationExists(PathBuf),

    #[error("Cannot create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Moving {} timed out after {:?}", path.display(), after)]
    MoveTimeout { path: PathBuf, after: Duration },

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("No move record with id {0}")]
    RecordNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No log entries between {from} and {to}")]
    NothingToExport { from: String, to: String },

    #[error("Processing queue is closed")]
    QueueClosed,
}

impl OrganizerError {
    /// Collisions are reported as skips rather than failures
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::DestinationExists(_))
    }
}
