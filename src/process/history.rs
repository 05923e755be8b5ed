// src/process/history.rs

//! Append-only audit history of submitted commands.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::fs::FileSystem;

/// Every command line ever submitted, oldest first.
///
/// When backed by a file, each submission is appended as one line and the
/// existing file is loaded on startup, so the recents list survives
/// restarts even though processes do not.
pub struct AuditLog {
    file: Option<(PathBuf, Arc<dyn FileSystem>)>,
    entries: Mutex<Vec<String>>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("path", &self.file.as_ref().map(|(path, _)| path))
            .field("entries", &self.len())
            .finish()
    }
}

impl AuditLog {
    pub fn in_memory() -> Self {
        Self {
            file: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Open (or create on first write) a history file.
    pub fn with_file(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let path = path.into();
        let entries = if fs.exists(&path) {
            fs.read_to_string(&path)
                .with_context(|| format!("reading history file {:?}", path))?
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        debug!(path = ?path, entries = entries.len(), "loaded command history");

        Ok(Self {
            file: Some((path, fs)),
            entries: Mutex::new(entries),
        })
    }

    /// Record one submission.
    ///
    /// A failing history file is logged and otherwise ignored: losing an
    /// audit line must not prevent the command from running.
    pub fn record(&self, command: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(command.to_string());

        if let Some((path, fs)) = &self.file {
            let line = format!("{command}\n");
            if let Err(e) = fs.append(path, line.as_bytes()) {
                warn!(path = ?path, error = %e, "failed to append to command history");
            }
        }
    }

    /// Most recent distinct commands, newest first.
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        entries
            .iter()
            .rev()
            .filter(|cmd| seen.insert(cmd.as_str()))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use crate::fs::mock::MockFileSystem;
    use std::path::Path;

    #[test]
    fn recent_is_newest_first_and_distinct() {
        let log = AuditLog::in_memory();
        for cmd in ["a", "b", "a", "c", "b"] {
            log.record(cmd);
        }

        assert_eq!(log.len(), 5);
        assert_eq!(log.recent(10), vec!["b", "c", "a"]);
        assert_eq!(log.recent(2), vec!["b", "c"]);
    }

    #[test]
    fn file_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/history.txt");

        {
            let log = AuditLog::with_file(&path, Arc::new(RealFileSystem)).unwrap();
            log.record("deploy:v1");
            log.record("status");
        }

        let reopened = AuditLog::with_file(&path, Arc::new(RealFileSystem)).unwrap();
        assert_eq!(reopened.recent(10), vec!["status", "deploy:v1"]);
    }

    #[test]
    fn existing_history_is_loaded_and_appended() {
        let fs = MockFileSystem::new();
        fs.add_file("/state/history.txt", "status\n\ndeploy:v1\n");

        let log = AuditLog::with_file("/state/history.txt", Arc::new(fs.clone())).unwrap();
        assert_eq!(log.len(), 2);

        log.record("rollback");
        assert_eq!(log.recent(10), vec!["rollback", "deploy:v1", "status"]);
        assert_eq!(
            fs.read_to_string(Path::new("/state/history.txt")).unwrap(),
            "status\n\ndeploy:v1\nrollback\n"
        );
    }

    #[test]
    fn unwritable_history_still_records_in_memory() {
        let fs = MockFileSystem::new();
        let log = AuditLog::with_file("/state/history.txt", Arc::new(fs.clone())).unwrap();
        // The history path turns into a directory after startup.
        fs.add_file("/state/history.txt/blocker", "");

        log.record("status");

        assert_eq!(log.recent(10), vec!["status"]);
        assert!(fs.is_dir(Path::new("/state/history.txt")));
    }
}
