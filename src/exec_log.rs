use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::project::Language;

/// Maximum number of retained records. Older entries are silently
/// dropped by slicing — no alerting on loss.
pub const MAX_RECORDS: usize = 50;

/// Which surface executed the run.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// HTML/CSS/JS rendered on the client preview surface.
    Client,
    /// Python executed in the sandbox worker.
    Sandbox,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Client => f.write_str("client"),
            Channel::Sandbox => f.write_str("sandbox"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => f.write_str("ok"),
            RunStatus::Error => f.write_str("error"),
        }
    }
}

/// One run attempt, successful or not.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecutionLogRecord {
    /// Epoch milliseconds.
    pub at: i64,
    pub channel: Channel,
    pub language: Language,
    pub status: RunStatus,
    pub user: String,
}

/// Append-only audit trail of run attempts, capped to the most recent
/// [`MAX_RECORDS`] entries. Backed by a single JSON array on disk.
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one record and truncates the log to the newest
    /// [`MAX_RECORDS`] entries.
    pub fn append(
        &self,
        channel: Channel,
        language: Language,
        status: RunStatus,
        user: &str,
    ) -> Result<()> {
        let mut records = self.records()?;
        records.push(ExecutionLogRecord {
            at: chrono::Utc::now().timestamp_millis(),
            channel,
            language,
            status,
            user: user.to_string(),
        });
        let start = records.len().saturating_sub(MAX_RECORDS);
        fs::write(&self.path, serde_json::to_string(&records[start..])?)?;
        Ok(())
    }

    /// All retained records, oldest first. A corrupt log file starts over
    /// empty rather than failing the run that triggered the read.
    pub fn records(&self) -> Result<Vec<ExecutionLogRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Execution log at {} is corrupt, starting over: {e}", self.path.display());
                Ok(Vec::new())
            }
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.records()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_in(dir: &tempfile::TempDir) -> ExecutionLog {
        ExecutionLog::open(dir.path().join("exec_log.json"))
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        log.append(Channel::Sandbox, Language::Python, RunStatus::Ok, "alice")
            .unwrap();
        log.append(Channel::Client, Language::Html, RunStatus::Ok, "alice")
            .unwrap();

        let records = log.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].channel, Channel::Sandbox);
        assert_eq!(records[0].status, RunStatus::Ok);
        assert_eq!(records[1].channel, Channel::Client);
        assert_eq!(records[1].user, "alice");
        assert!(records[0].at > 0);
    }

    #[test]
    fn test_never_exceeds_cap() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        for i in 0..(MAX_RECORDS + 10) {
            let user = format!("run-{i}");
            log.append(Channel::Sandbox, Language::Python, RunStatus::Ok, &user)
                .unwrap();
        }
        assert_eq!(log.len().unwrap(), MAX_RECORDS);
    }

    #[test]
    fn test_oldest_records_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        for i in 0..=MAX_RECORDS {
            let user = format!("run-{i}");
            log.append(Channel::Sandbox, Language::Python, RunStatus::Ok, &user)
                .unwrap();
        }
        let records = log.records().unwrap();
        assert_eq!(records.len(), MAX_RECORDS);
        // 51 appends: run-0 is gone, run-50 is the newest
        assert!(!records.iter().any(|r| r.user == "run-0"));
        assert_eq!(records.last().unwrap().user, format!("run-{MAX_RECORDS}"));
    }

    #[test]
    fn test_corrupt_log_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exec_log.json");
        fs::write(&path, "][").unwrap();
        let log = ExecutionLog::open(&path);
        assert!(log.is_empty().unwrap());
        log.append(Channel::Client, Language::Html, RunStatus::Ok, "bob")
            .unwrap();
        assert_eq!(log.len().unwrap(), 1);
    }

    #[test]
    fn test_record_wire_format() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_in(&dir);
        log.append(Channel::Sandbox, Language::Python, RunStatus::Error, "eve")
            .unwrap();
        let raw = fs::read_to_string(dir.path().join("exec_log.json")).unwrap();
        assert!(raw.contains("\"channel\":\"sandbox\""));
        assert!(raw.contains("\"language\":\"python\""));
        assert!(raw.contains("\"status\":\"error\""));
        assert!(raw.contains("\"user\":\"eve\""));
    }
}
