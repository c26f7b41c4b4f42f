// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Undo/redo ledger for completed moves

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::grammar::UNDO_MARKER;
use crate::mover::move_path;
use crate::{OrganizerError, Result};

/// A completed move that can be reversed and re-applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub id: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Where the item is now: `destination_path`, or the undo destination
    pub current_location: PathBuf,
    pub is_undone: bool,
}

impl MoveRecord {
    pub fn new(source_path: PathBuf, destination_path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            current_location: destination_path.clone(),
            source_path,
            destination_path,
            message: message.into(),
            timestamp: Utc::now(),
            is_undone: false,
        }
    }

    /// Where an undo puts the item: back in the source directory, as
    /// `<stem> (Undo)<ext>` so the watchers leave it alone
    pub fn undo_destination(&self) -> PathBuf {
        let dir = self.source_path.parent().unwrap_or_else(|| Path::new(""));
        let name = &self.destination_path;
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = match name.extension() {
            Some(ext) => format!("{} {}.{}", stem, UNDO_MARKER, ext.to_string_lossy()),
            None => format!("{} {}", stem, UNDO_MARKER),
        };
        dir.join(file_name)
    }

    /// Whether something exists at `current_location`
    pub fn is_present(&self) -> bool {
        fs::symlink_metadata(&self.current_location).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Outcome of `undo_all` / `redo_all`
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Ids of records that moved, in processing order
    pub done: Vec<String>,
    pub failed: Vec<(String, OrganizerError)>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Records plus two stacks of indices into them
#[derive(Debug, Default)]
pub struct UndoLedger {
    records: Vec<MoveRecord>,
    undo_stack: Vec<usize>,
    redo_stack: Vec<usize>,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the stacks from persisted records, oldest first
    pub fn from_records(records: Vec<MoveRecord>) -> Self {
        let undo_stack = (0..records.len()).filter(|&i| !records[i].is_undone).collect();
        // The oldest undone record was most likely undone last
        let redo_stack = (0..records.len()).rev().filter(|&i| records[i].is_undone).collect();
        Self {
            records,
            undo_stack,
            redo_stack,
        }
    }

    /// Register a new move. Any pending redo history is discarded.
    pub fn push(&mut self, record: MoveRecord) -> &MoveRecord {
        let index = self.records.len();
        self.records.push(record);
        self.undo_stack.push(index);
        self.redo_stack.clear();
        &self.records[index]
    }

    /// Reverse the most recent move
    pub fn undo(&mut self) -> Result<&MoveRecord> {
        let index = *self.undo_stack.last().ok_or(OrganizerError::NothingToUndo)?;
        apply(&mut self.records[index], Direction::Undo)?;
        self.undo_stack.pop();
        self.redo_stack.push(index);
        Ok(&self.records[index])
    }

    /// Re-apply the most recently undone move
    pub fn redo(&mut self) -> Result<&MoveRecord> {
        let index = *self.redo_stack.last().ok_or(OrganizerError::NothingToRedo)?;
        apply(&mut self.records[index], Direction::Redo)?;
        self.redo_stack.pop();
        self.undo_stack.push(index);
        Ok(&self.records[index])
    }

    /// Reverse one specific move, wherever it sits on the stack
    pub fn undo_entry(&mut self, id: &str) -> Result<&MoveRecord> {
        let index = self.index_of(id)?;
        if self.records[index].is_undone {
            return Err(OrganizerError::InvalidState(format!("{} is already undone", id)));
        }
        apply(&mut self.records[index], Direction::Undo)?;
        self.undo_stack.retain(|&i| i != index);
        self.redo_stack.push(index);
        Ok(&self.records[index])
    }

    /// Re-apply one specific undone move
    pub fn redo_entry(&mut self, id: &str) -> Result<&MoveRecord> {
        let index = self.index_of(id)?;
        if !self.records[index].is_undone {
            return Err(OrganizerError::InvalidState(format!("{} is not undone", id)));
        }
        apply(&mut self.records[index], Direction::Redo)?;
        self.redo_stack.retain(|&i| i != index);
        self.undo_stack.push(index);
        Ok(&self.records[index])
    }

    /// Undo everything, newest first. Failures stay on the undo stack.
    pub fn undo_all(&mut self) -> BulkReport {
        self.drain(Direction::Undo)
    }

    /// Redo everything undone, most recently undone first
    pub fn redo_all(&mut self) -> BulkReport {
        self.drain(Direction::Redo)
    }

    fn drain(&mut self, direction: Direction) -> BulkReport {
        let (from, to) = match direction {
            Direction::Undo => (&mut self.undo_stack, &mut self.redo_stack),
            Direction::Redo => (&mut self.redo_stack, &mut self.undo_stack),
        };

        let mut report = BulkReport::default();
        let mut kept = Vec::new();

        while let Some(index) = from.pop() {
            let record = &mut self.records[index];
            match apply(record, direction) {
                Ok(()) => {
                    report.done.push(record.id.clone());
                    to.push(index);
                }
                Err(e) => {
                    warn!("{:?} of {:?} failed: {}", direction, record.current_location, e);
                    report.failed.push((record.id.clone(), e));
                    kept.push(index);
                }
            }
        }

        kept.reverse();
        from.extend(kept);
        report
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| OrganizerError::RecordNotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&MoveRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[MoveRecord] {
        &self.records
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Move a record's item one way. On error nothing about the record changes.
fn apply(record: &mut MoveRecord, direction: Direction) -> Result<()> {
    let target = match direction {
        Direction::Undo => record.undo_destination(),
        Direction::Redo => record.destination_path.clone(),
    };

    if fs::symlink_metadata(&record.current_location).is_err() {
        return Err(OrganizerError::SourceMissing(record.current_location.clone()));
    }
    if fs::symlink_metadata(&target).is_ok() {
        return Err(OrganizerError::DestinationExists(target));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| OrganizerError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    move_path(&record.current_location, &target)?;
    debug!("{:?}: {:?} -> {:?}", direction, record.current_location, target);
    info!(
        "{} {}",
        if direction == Direction::Undo { "Undid" } else { "Redid" },
        record.message
    );

    record.current_location = target;
    record.is_undone = direction == Direction::Undo;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Setup {
        _tmp: TempDir,
        watch: PathBuf,
        target: PathBuf,
    }

    fn setup() -> Setup {
        let tmp = TempDir::new().unwrap();
        let watch = tmp.path().join("watch");
        let target = tmp.path().join("target");
        fs::create_dir_all(&watch).unwrap();
        fs::create_dir_all(&target).unwrap();
        Setup { _tmp: tmp, watch, target }
    }

    impl Setup {
        /// Simulate a completed move of `"<folder>, <name>"` to `target/<folder>/<name>`
        fn moved(&self, folder: &str, name: &str) -> MoveRecord {
            let dir = self.target.join(folder);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), name).unwrap();
            MoveRecord::new(
                self.watch.join(format!("{}, {}", folder, name)),
                dir.join(name),
                format!("Moved: {}", name),
            )
        }
    }

    #[test]
    fn test_undo_destination_carries_marker() {
        let record = MoveRecord::new(
            PathBuf::from("/w/Docs, Report (Q1).pdf"),
            PathBuf::from("/t/Docs/Q1/Report.pdf"),
            "m",
        );
        assert_eq!(record.undo_destination(), PathBuf::from("/w/Report (Undo).pdf"));

        let dir = MoveRecord::new(PathBuf::from("/w/Movies, Film"), PathBuf::from("/t/Movies/Film"), "m");
        assert_eq!(dir.undo_destination(), PathBuf::from("/w/Film (Undo)"));
    }

    #[test]
    fn test_undo_redo_symmetry() {
        let s = setup();
        let mut ledger = UndoLedger::new();
        let record = s.moved("Docs", "Report.pdf");
        let destination = record.destination_path.clone();
        ledger.push(record);

        let undone = ledger.undo().unwrap().clone();
        assert!(undone.is_undone);
        assert_eq!(undone.current_location, s.watch.join("Report (Undo).pdf"));
        assert!(undone.is_present());
        assert!(!destination.exists());
        assert!(!ledger.can_undo());
        assert!(ledger.can_redo());

        let redone = ledger.redo().unwrap();
        assert!(!redone.is_undone);
        assert_eq!(redone.current_location, destination);
        assert!(destination.exists());
        assert!(!s.watch.join("Report (Undo).pdf").exists());
    }

    #[test]
    fn test_bulk_undo_is_lifo() {
        let s = setup();
        let mut ledger = UndoLedger::new();
        let ids: Vec<String> = ["A", "B", "C"]
            .iter()
            .map(|n| ledger.push(s.moved("Docs", &format!("{}.txt", n))).id.clone())
            .collect();

        let report = ledger.undo_all();
        assert!(report.is_clean());
        assert_eq!(report.done, vec![ids[2].clone(), ids[1].clone(), ids[0].clone()]);

        let report = ledger.redo_all();
        assert_eq!(report.done, ids);
        assert!(ledger.records().iter().all(|r| !r.is_undone && r.is_present()));
    }

    #[test]
    fn test_missing_file_is_a_no_op_failure() {
        let s = setup();
        let mut ledger = UndoLedger::new();
        let record = s.moved("Docs", "Gone.txt");
        fs::remove_file(&record.destination_path).unwrap();
        let id = ledger.push(record).id.clone();

        assert!(matches!(ledger.undo(), Err(OrganizerError::SourceMissing(_))));
        let record = ledger.get(&id).unwrap();
        assert!(!record.is_undone);
        assert_eq!(record.current_location, record.destination_path);
        assert!(ledger.can_undo());
        assert!(!ledger.can_redo());
    }

    #[test]
    fn test_bulk_failures_stay_on_stack() {
        let s = setup();
        let mut ledger = UndoLedger::new();
        ledger.push(s.moved("Docs", "A.txt"));
        let broken = s.moved("Docs", "B.txt");
        fs::remove_file(&broken.destination_path).unwrap();
        let broken_id = ledger.push(broken).id.clone();
        ledger.push(s.moved("Docs", "C.txt"));

        let report = ledger.undo_all();
        assert_eq!(report.done.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, broken_id);
        assert!(ledger.can_undo());
        assert!(ledger.undo().unwrap_err().to_string().contains("B.txt"));
    }

    #[test]
    fn test_push_clears_redo() {
        let s = setup();
        let mut ledger = UndoLedger::new();
        ledger.push(s.moved("Docs", "A.txt"));
        ledger.undo().unwrap();
        assert!(ledger.can_redo());

        ledger.push(s.moved("Docs", "B.txt"));
        assert!(!ledger.can_redo());
        assert!(matches!(ledger.redo(), Err(OrganizerError::NothingToRedo)));
    }

    #[test]
    fn test_entry_toggles_and_rebuild() {
        let s = setup();
        let mut ledger = UndoLedger::new();
        let first = ledger.push(s.moved("Docs", "A.txt")).id.clone();
        ledger.push(s.moved("Docs", "B.txt"));

        ledger.undo_entry(&first).unwrap();
        assert!(matches!(ledger.undo_entry(&first), Err(OrganizerError::InvalidState(_))));
        assert!(matches!(ledger.redo_entry("nope"), Err(OrganizerError::RecordNotFound(_))));

        let rebuilt = UndoLedger::from_records(ledger.records().to_vec());
        assert!(rebuilt.can_undo());
        assert!(rebuilt.can_redo());

        ledger.redo_entry(&first).unwrap();
        assert!(!ledger.can_redo());
        assert!(ledger.get(&first).unwrap().is_present());
    }
}
