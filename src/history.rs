// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persistent activity log and the journal tying it to the undo ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::events::EngineEvent;
use crate::ledger::{BulkReport, MoveRecord, UndoLedger};
use crate::{OrganizerError, Result};

/// One line of the activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Present for completed moves only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<MoveRecord>,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            record: None,
        }
    }

    pub fn for_move(record: MoveRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            message: record.message.clone(),
            record: Some(record),
        }
    }
}

/// JSONL activity log
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an entry to the log
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all log entries
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Failed to parse log entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<LogEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Replace the stored copy of each given record
    pub fn update_records(&self, records: &[MoveRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let entries = self.read_all()?;

        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);

        for mut entry in entries {
            if let Some(stored) = entry.record.as_mut() {
                if let Some(updated) = records.iter().find(|r| r.id == stored.id) {
                    *stored = updated.clone();
                }
            }
            let json = serde_json::to_string(&entry)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(())
    }

    pub fn update_record(&self, record: &MoveRecord) -> Result<()> {
        self.update_records(std::slice::from_ref(record))
    }

    /// Move records in the order they were logged
    pub fn move_records(&self) -> Result<Vec<MoveRecord>> {
        Ok(self.read_all()?.into_iter().filter_map(|e| e.record).collect())
    }

    /// Clear the whole log
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Write entries logged between `from` and `to` (inclusive) to `output`.
    ///
    /// A `.json` output gets a JSON array, anything else one
    /// `[timestamp] message` line per entry. Returns the number exported.
    pub fn export(&self, from: DateTime<Utc>, to: DateTime<Utc>, output: &Path) -> Result<usize> {
        let entries: Vec<LogEntry> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .collect();

        if entries.is_empty() {
            return Err(OrganizerError::NothingToExport {
                from: from.format("%Y-%m-%d %H:%M:%S").to_string(),
                to: to.format("%Y-%m-%d %H:%M:%S").to_string(),
            });
        }

        let is_json = output
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let mut writer = BufWriter::new(File::create(output)?);
        if is_json {
            serde_json::to_writer_pretty(&mut writer, &entries)?;
        } else {
            for entry in &entries {
                writeln!(
                    writer,
                    "[{}] {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.message
                )?;
            }
        }
        writer.flush()?;

        info!("Exported {} log entries to {:?}", entries.len(), output);
        Ok(entries.len())
    }

    /// Get log file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Activity log plus the undo ledger rebuilt from it
pub struct Journal {
    log: ActivityLog,
    ledger: UndoLedger,
}

impl Journal {
    /// Open the log at `path`, restoring undo/redo state from its records
    pub fn open(path: PathBuf) -> Result<Self> {
        let log = ActivityLog::new(path);
        let ledger = UndoLedger::from_records(log.move_records()?);
        Ok(Self { log, ledger })
    }

    /// Persist an engine event; completed moves become undoable
    pub fn record(&mut self, event: &EngineEvent) -> Result<()> {
        let entry = match (&event.source, &event.destination) {
            (Some(source), Some(destination)) => {
                let record = MoveRecord::new(source.clone(), destination.clone(), event.message.clone());
                LogEntry::for_move(self.ledger.push(record).clone())
            }
            _ => LogEntry::new(event.message.clone()),
        };
        self.log.append(&entry)
    }

    pub fn undo_last(&mut self) -> Result<MoveRecord> {
        let result = self.ledger.undo().cloned();
        self.finish_undo(result)
    }

    pub fn redo_last(&mut self) -> Result<MoveRecord> {
        let result = self.ledger.redo().cloned();
        self.finish_redo(result)
    }

    pub fn undo_entry(&mut self, id: &str) -> Result<MoveRecord> {
        let result = self.ledger.undo_entry(id).cloned();
        self.finish_undo(result)
    }

    pub fn redo_entry(&mut self, id: &str) -> Result<MoveRecord> {
        let result = self.ledger.redo_entry(id).cloned();
        self.finish_redo(result)
    }

    pub fn undo_all(&mut self) -> Result<BulkReport> {
        let report = self.ledger.undo_all();
        self.persist_bulk(&report, undo_message, "Undo")?;
        Ok(report)
    }

    pub fn redo_all(&mut self) -> Result<BulkReport> {
        let report = self.ledger.redo_all();
        self.persist_bulk(&report, redo_message, "Redo")?;
        Ok(report)
    }

    /// Each record paired with whether its item is where the log says
    pub fn verify(&self) -> Vec<(&MoveRecord, bool)> {
        self.ledger
            .records()
            .iter()
            .map(|record| (record, record.is_present()))
            .collect()
    }

    /// Forget all history; files are not touched
    pub fn clear(&mut self) -> Result<()> {
        self.log.clear()?;
        self.ledger.clear();
        Ok(())
    }

    pub fn ledger(&self) -> &UndoLedger {
        &self.ledger
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    fn finish_undo(&mut self, result: Result<MoveRecord>) -> Result<MoveRecord> {
        match result {
            Ok(record) => {
                self.log.update_record(&record)?;
                self.log.append(&LogEntry::new(undo_message(&record)))?;
                Ok(record)
            }
            Err(e) => {
                self.note_failure("Undo", &e);
                Err(e)
            }
        }
    }

    fn finish_redo(&mut self, result: Result<MoveRecord>) -> Result<MoveRecord> {
        match result {
            Ok(record) => {
                self.log.update_record(&record)?;
                self.log.append(&LogEntry::new(redo_message(&record)))?;
                Ok(record)
            }
            Err(e) => {
                self.note_failure("Redo", &e);
                Err(e)
            }
        }
    }

    fn persist_bulk(
        &self,
        report: &BulkReport,
        message: fn(&MoveRecord) -> String,
        action: &str,
    ) -> Result<()> {
        let records: Vec<MoveRecord> = report
            .done
            .iter()
            .filter_map(|id| self.ledger.get(id).cloned())
            .collect();
        self.log.update_records(&records)?;

        for record in &records {
            self.log.append(&LogEntry::new(message(record)))?;
        }
        for (_, e) in &report.failed {
            self.note_failure(action, e);
        }
        Ok(())
    }

    fn note_failure(&self, action: &str, error: &OrganizerError) {
        // Nothing to undo/redo is not worth a log line
        if matches!(error, OrganizerError::NothingToUndo | OrganizerError::NothingToRedo) {
            return;
        }
        let line = LogEntry::new(format!("{} error: {} ({})", action, error, action));
        if let Err(e) = self.log.append(&line) {
            warn!("Cannot write to activity log: {}", e);
        }
    }
}

fn undo_message(record: &MoveRecord) -> String {
    let name = record
        .current_location
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("Moved back to original location: {} (Undo)", name)
}

fn redo_message(record: &MoveRecord) -> String {
    let dir = record
        .current_location
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    format!("Restored to: {} (Redo)", dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn moved_event(tmp: &TempDir, name: &str) -> EngineEvent {
        let dir = tmp.path().join("target/Docs");
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(tmp.path().join("watch")).unwrap();
        fs::write(dir.join(name), name).unwrap();
        EngineEvent::moved(
            format!("Moved: Docs, {} → {}", name, dir.display()),
            tmp.path().join("watch").join(format!("Docs, {}", name)),
            dir.join(name),
        )
    }

    #[test]
    fn test_append_and_recent() {
        let tmp = TempDir::new().unwrap();
        let log = ActivityLog::new(tmp.path().join("logs/activity.jsonl"));

        for i in 0..3 {
            log.append(&LogEntry::new(format!("entry {}", i))).unwrap();
        }

        let recent = log.get_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "entry 2");
        assert_eq!(recent[1].message, "entry 1");
        assert!(log.move_records().unwrap().is_empty());
    }

    #[test]
    fn test_journal_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("activity.jsonl");

        let mut journal = Journal::open(path.clone()).unwrap();
        journal.record(&EngineEvent::info("Watching 1 folder")).unwrap();
        journal.record(&moved_event(&tmp, "Report.pdf")).unwrap();
        assert!(journal.ledger().can_undo());
        drop(journal);

        let mut journal = Journal::open(path.clone()).unwrap();
        let undone = journal.undo_last().unwrap();
        assert!(undone.is_undone);
        assert!(tmp.path().join("watch/Report (Undo).pdf").exists());
        drop(journal);

        let journal = Journal::open(path).unwrap();
        assert!(!journal.ledger().can_undo());
        assert!(journal.ledger().can_redo());
        let messages: Vec<_> = journal
            .log()
            .read_all()
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages.len(), 3);
        assert!(messages[2].ends_with("(Undo)"));
    }

    #[test]
    fn test_bulk_undo_redo_and_verify() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::open(tmp.path().join("activity.jsonl")).unwrap();
        journal.record(&moved_event(&tmp, "A.txt")).unwrap();
        journal.record(&moved_event(&tmp, "B.txt")).unwrap();

        let report = journal.undo_all().unwrap();
        assert_eq!(report.done.len(), 2);
        assert!(journal.log().move_records().unwrap().iter().all(|r| r.is_undone));

        // Someone deletes one of the restored files
        fs::remove_file(tmp.path().join("watch/A (Undo).txt")).unwrap();
        let status: Vec<bool> = journal.verify().into_iter().map(|(_, ok)| ok).collect();
        assert_eq!(status, vec![false, true]);

        let report = journal.redo_all().unwrap();
        assert_eq!(report.done.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(tmp.path().join("target/Docs/B.txt").exists());

        let last = journal.log().get_recent(1).unwrap();
        assert!(last[0].message.starts_with("Redo error"));
    }

    #[test]
    fn test_export_by_range() {
        let tmp = TempDir::new().unwrap();
        let log = ActivityLog::new(tmp.path().join("activity.jsonl"));
        let mut old = LogEntry::new("last week");
        old.timestamp = Utc::now() - Duration::days(7);
        log.append(&old).unwrap();
        log.append(&LogEntry::new("today")).unwrap();

        let from = Utc::now() - Duration::days(1);
        let to = Utc::now() + Duration::minutes(1);

        let text = tmp.path().join("out.txt");
        assert_eq!(log.export(from, to, &text).unwrap(), 1);
        let content = fs::read_to_string(&text).unwrap();
        assert!(content.starts_with('['));
        assert!(content.trim_end().ends_with("] today"));

        let json = tmp.path().join("out.json");
        log.export(from, to, &json).unwrap();
        let parsed: Vec<LogEntry> = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].message, "today");

        let empty = log.export(to, to + Duration::days(1), &text);
        assert!(matches!(empty, Err(OrganizerError::NothingToExport { .. })));
    }

    #[test]
    fn test_clear() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("activity.jsonl");
        let mut journal = Journal::open(path.clone()).unwrap();
        journal.record(&moved_event(&tmp, "A.txt")).unwrap();

        journal.clear().unwrap();
        assert!(!path.exists());
        assert!(!journal.ledger().can_undo());
        assert!(tmp.path().join("target/Docs/A.txt").exists());
    }
}
