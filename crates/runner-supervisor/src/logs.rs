//! Log persistence - store runner output to disk
//!
//! Directory structure:
//! ```text
//! .pilot-data/
//!   logs/
//!     {runner_id}.jsonl   # Output log (newline-delimited JSON)
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::event::OutputStream;

/// One persisted output record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub process_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stream: OutputStream,
    pub message: String,
}

/// Append-only jsonl store for runner output
#[derive(Debug, Clone)]
pub struct LogStore {
    base_dir: PathBuf,
}

impl LogStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("logs"),
        }
    }

    fn log_path(&self, runner_id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", runner_id))
    }

    /// Append an entry to a runner's log
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(entry.process_id))?;

        let line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{}", line)?;

        Ok(())
    }

    /// Load a runner's log, newest last. With a limit, only the trailing
    /// `limit` entries are returned. A runner with no log yields an empty
    /// list.
    pub fn load(&self, runner_id: Uuid, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let path = self.log_path(runner_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping corrupt log line: {}", e),
            }
        }

        if let Some(limit) = limit {
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }

        Ok(entries)
    }

    /// Delete a runner's log. Absent logs are fine.
    pub fn clear(&self, runner_id: Uuid) -> Result<()> {
        match std::fs::remove_file(self.log_path(runner_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(runner_id: Uuid, message: &str) -> LogEntry {
        LogEntry {
            process_id: runner_id,
            timestamp: Utc::now(),
            stream: OutputStream::Stdout,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_append_and_load() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let id = Uuid::new_v4();

        store.append(&entry(id, "first")).unwrap();
        store.append(&entry(id, "second")).unwrap();

        let entries = store.load(id, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
    }

    #[test]
    fn test_load_with_limit_keeps_tail() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let id = Uuid::new_v4();

        for i in 0..5 {
            store.append(&entry(id, &i.to_string())).unwrap();
        }

        let entries = store.load(id, Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "3");
        assert_eq!(entries[1].message, "4");
    }

    #[test]
    fn test_load_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());

        let entries = store.load(Uuid::new_v4(), None).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let id = Uuid::new_v4();

        store.append(&entry(id, "x")).unwrap();
        store.clear(id).unwrap();
        store.clear(id).unwrap();
        assert!(store.load(id, None).unwrap().is_empty());
    }
}
