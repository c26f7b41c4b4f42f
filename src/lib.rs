// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tagsort: filename-driven file organizer
//!
//! Watches folders for files named `FOLDER, Name (tag) [tag] -tag-.ext` and
//! moves each one to `target/FOLDER/tag/tag/tag/Name.ext`, keeping an
//! undoable log of every move.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod grammar;
pub mod history;
pub mod ledger;
pub mod manager;
pub mod mover;
pub mod queue;
pub mod scan;
pub mod watcher;
pub mod worker;

pub use config::AppConfig;
pub use engine::Engine;
pub use error::{OrganizerError, Result};
