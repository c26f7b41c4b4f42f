// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Move executor: relocates files and directory trees, across volumes if needed

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{OrganizerError, Result};

/// Upper bound for a single directory move
pub const DEFAULT_DIR_MOVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Performs the relocation step of the pipeline
#[derive(Debug, Clone)]
pub struct MoveExecutor {
    dir_timeout: Duration,
}

impl MoveExecutor {
    pub fn new(dir_timeout: Duration) -> Self {
        Self { dir_timeout }
    }

    /// Create `destination_dir` and move `source` to `destination_dir/final_file_name`.
    ///
    /// An existing destination is never overwritten. Directory moves run on the
    /// blocking pool; once the timeout expires a tree copy is stopped and its
    /// partial destination removed.
    pub async fn execute(
        &self,
        source: &Path,
        destination_dir: &Path,
        final_file_name: &str,
    ) -> Result<PathBuf> {
        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OrganizerError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let destination = destination_dir.join(final_file_name);
        if fs::symlink_metadata(&destination).is_ok() {
            return Err(OrganizerError::DestinationExists(destination));
        }

        fs::create_dir_all(destination_dir).map_err(|source| OrganizerError::CreateDir {
            path: destination_dir.to_path_buf(),
            source,
        })?;

        if metadata.is_dir() {
            self.move_directory(source, &destination).await?;
        } else {
            move_file(source, &destination)?;
        }

        debug!("Moved {:?} -> {:?}", source, destination);
        Ok(destination)
    }

    async fn move_directory(&self, source: &Path, destination: &Path) -> Result<()> {
        let src = source.to_path_buf();
        let dst = destination.to_path_buf();
        self.run_cancellable(source, destination, move |cancel| move_dir(&src, &dst, cancel))
            .await
    }

    /// Run a blocking move under the directory timeout.
    ///
    /// On expiry the job is asked to stop and then awaited, so nothing keeps
    /// moving in the background. A job that completes anyway counts as done.
    async fn run_cancellable<F>(&self, source: &Path, destination: &Path, job: F) -> Result<()>
    where
        F: FnOnce(&AtomicBool) -> io::Result<()> + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let mut task = tokio::task::spawn_blocking(move || job(&flag));

        let joined = match tokio::time::timeout(self.dir_timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "Directory move {:?} -> {:?} exceeded {:?}, cancelling",
                    source, destination, self.dir_timeout
                );
                cancel.store(true, Ordering::SeqCst);
                match task.await {
                    Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {
                        return Err(OrganizerError::MoveTimeout {
                            path: source.to_path_buf(),
                            after: self.dir_timeout,
                        });
                    }
                    Ok(Ok(())) => {
                        warn!("Directory move {:?} completed after its deadline", source);
                        Ok(Ok(()))
                    }
                    other => other,
                }
            }
        };

        match joined {
            Ok(result) => result.map_err(OrganizerError::from),
            Err(e) => Err(OrganizerError::TaskFailed(e.to_string())),
        }
    }
}

impl Default for MoveExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_DIR_MOVE_TIMEOUT)
    }
}

/// Move a file or directory synchronously. Used by undo/redo.
pub fn move_path(source: &Path, destination: &Path) -> io::Result<()> {
    if fs::symlink_metadata(source)?.is_dir() {
        move_dir(source, destination, &AtomicBool::new(false))
    } else {
        move_file(source, destination)
    }
}

fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    if let Err(e) = fs::rename(source, destination) {
        debug!("Rename of {:?} failed ({}), copying instead", source, e);
        fs::copy(source, destination)?;
        if let Err(e) = fs::remove_file(source) {
            // Leave exactly one copy behind
            let _ = fs::remove_file(destination);
            return Err(e);
        }
    }
    Ok(())
}

fn move_dir(source: &Path, destination: &Path, cancel: &AtomicBool) -> io::Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }

    debug!("Bulk rename of {:?} failed, copying tree item by item", source);
    copy_then_remove(source, destination, cancel)
}

/// Cross-volume fallback. A failed or cancelled copy removes the partial
/// destination and leaves the source whole.
fn copy_then_remove(source: &Path, destination: &Path, cancel: &AtomicBool) -> io::Result<()> {
    if let Err(e) = copy_tree(source, destination, cancel) {
        let _ = fs::remove_dir_all(destination);
        return Err(e);
    }
    fs::remove_dir_all(source)
}

fn copy_tree(source: &Path, destination: &Path, cancel: &AtomicBool) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        if cancel.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "directory move cancelled",
            ));
        }

        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_moves_file_into_new_tree() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Docs, Report (Q1).pdf");
        fs::write(&source, b"report").unwrap();
        let dest_dir = tmp.path().join("target/Docs/Q1");

        let moved = MoveExecutor::default()
            .execute(&source, &dest_dir, "Report.pdf")
            .await
            .unwrap();

        assert_eq!(moved, dest_dir.join("Report.pdf"));
        assert!(!source.exists());
        assert_eq!(fs::read(&moved).unwrap(), b"report");
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Docs, Report.pdf");
        fs::write(&source, b"new").unwrap();
        let dest_dir = tmp.path().join("Docs");
        fs::create_dir_all(&dest_dir).unwrap();
        fs::write(dest_dir.join("Report.pdf"), b"old").unwrap();

        let err = MoveExecutor::default()
            .execute(&source, &dest_dir, "Report.pdf")
            .await
            .unwrap_err();

        assert!(err.is_skip());
        assert_eq!(fs::read(&source).unwrap(), b"new");
        assert_eq!(fs::read(dest_dir.join("Report.pdf")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = MoveExecutor::default()
            .execute(&tmp.path().join("gone"), tmp.path(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, OrganizerError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn test_moves_directory() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Movies, Inception (2010)");
        fs::create_dir_all(source.join("extras")).unwrap();
        fs::write(source.join("movie.mkv"), b"m").unwrap();
        fs::write(source.join("extras/trailer.mkv"), b"t").unwrap();
        let dest_dir = tmp.path().join("target/Movies/2010");

        let moved = MoveExecutor::default()
            .execute(&source, &dest_dir, "Inception")
            .await
            .unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(moved.join("extras/trailer.mkv")).unwrap(), b"t");
    }

    #[test]
    fn test_copy_tree_fallback() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        fs::create_dir_all(source.join("a/b")).unwrap();
        fs::write(source.join("a/b/c.txt"), b"c").unwrap();
        fs::write(source.join("root.txt"), b"r").unwrap();
        let destination = tmp.path().join("dst");

        copy_tree(&source, &destination, &AtomicBool::new(false)).unwrap();

        assert_eq!(fs::read(destination.join("a/b/c.txt")).unwrap(), b"c");
        assert_eq!(fs::read(destination.join("root.txt")).unwrap(), b"r");
        assert!(source.exists());
    }

    #[test]
    fn test_cancelled_copy_leaves_source_whole() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        fs::create_dir_all(source.join("a")).unwrap();
        fs::write(source.join("a/one.txt"), b"1").unwrap();
        let destination = tmp.path().join("dst");

        let err = copy_then_remove(&source, &destination, &AtomicBool::new(true)).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(!destination.exists());
        assert_eq!(fs::read(source.join("a/one.txt")).unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_timed_out_copy_is_cancelled_and_reported() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Movies, Film (2010)");
        fs::create_dir_all(&source).unwrap();
        for i in 0..50 {
            fs::write(source.join(format!("{}.bin", i)), b"x").unwrap();
        }
        let destination = tmp.path().join("target/Film");
        fs::create_dir_all(tmp.path().join("target")).unwrap();

        // Stand-in for a slow cross-volume copy: waits for the cancel flag first
        let (src, dst) = (source.clone(), destination.clone());
        let job = move |cancel: &AtomicBool| {
            while !cancel.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            copy_then_remove(&src, &dst, cancel)
        };

        let err = MoveExecutor::new(Duration::from_millis(20))
            .run_cancellable(&source, &destination, job)
            .await
            .unwrap_err();

        assert!(matches!(err, OrganizerError::MoveTimeout { .. }));
        assert!(err.to_string().contains("20ms"));
        // Nothing keeps moving after the error is returned
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(&source).unwrap().count(), 50);
    }

    #[tokio::test]
    async fn test_move_finishing_after_deadline_counts_as_moved() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("slow");
        fs::create_dir_all(&source).unwrap();
        let destination = tmp.path().join("done");

        let (src, dst) = (source.clone(), destination.clone());
        let job = move |_: &AtomicBool| {
            std::thread::sleep(Duration::from_millis(50));
            fs::rename(&src, &dst)
        };

        MoveExecutor::new(Duration::from_millis(1))
            .run_cancellable(&source, &destination, job)
            .await
            .unwrap();

        assert!(destination.exists());
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_uncreatable_destination_dir() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Docs, a.txt");
        fs::write(&source, b"a").unwrap();
        // A regular file where a parent directory should be
        let blocker = tmp.path().join("target");
        fs::write(&blocker, b"not a dir").unwrap();

        let err = MoveExecutor::default()
            .execute(&source, &blocker.join("Docs"), "a.txt")
            .await
            .unwrap_err();

        assert!(matches!(err, OrganizerError::CreateDir { .. }));
        assert!(!err.is_skip());
        assert!(source.exists());
    }

    #[test]
    fn test_move_path_file() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.txt");
        fs::write(&source, b"a").unwrap();
        let destination = tmp.path().join("b.txt");

        move_path(&source, &destination).unwrap();

        assert!(!source.exists());
        assert!(destination.exists());
    }
}
