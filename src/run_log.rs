//! Per-run artifact store.
//!
//! Every run owns `<logs_root>/<job>/<run_id>/`, holding a line-oriented
//! `execution.log`, a `messages.jsonl` transcript of agent messages, and JSON
//! or text snapshots written by the workflows. Entries are mirrored to
//! `tracing`. Failing to write a log line never fails the run.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::run_id::RunId;

/// Line-oriented execution log.
pub const EXECUTION_LOG: &str = "execution.log";
/// JSON-lines transcript of agent messages.
pub const MESSAGES_LOG: &str = "messages.jsonl";

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Artifact directory of one run.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
    run_id: RunId,
}

impl RunLog {
    /// Creates `<logs_root>/<job_name>/<run_id>/`.
    pub fn create(logs_root: &Path, job_name: &str, run_id: &RunId) -> Result<Self> {
        let dir = logs_root.join(job_name).join(run_id.as_str());
        fs::create_dir_all(&dir).map_err(|e| {
            Error::workspace_with(format!("failed to create log directory {}", dir.display()), e)
        })?;

        tracing::debug!(dir = ?dir, "created run log directory");

        Ok(Self {
            dir,
            run_id: run_id.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Path of an artifact inside the run directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn info(&self, message: &str) {
        self.entry(LogLevel::Info, message, None::<&()>);
    }

    pub fn warn(&self, message: &str) {
        self.entry(LogLevel::Warn, message, None::<&()>);
    }

    pub fn error(&self, message: &str) {
        self.entry(LogLevel::Error, message, None::<&()>);
    }

    /// Logs an entry followed by `data` as pretty JSON.
    pub fn info_with<T: Serialize>(&self, message: &str, data: &T) {
        self.entry(LogLevel::Info, message, Some(data));
    }

    /// Appends one entry to `execution.log` and mirrors it to `tracing`.
    pub fn entry<T: Serialize>(&self, level: LogLevel, message: &str, data: Option<&T>) {
        match level {
            LogLevel::Info => tracing::info!(run_id = %self.run_id, "{}", message),
            LogLevel::Warn => tracing::warn!(run_id = %self.run_id, "{}", message),
            LogLevel::Error => tracing::error!(run_id = %self.run_id, "{}", message),
        }

        let mut line = format!(
            "[{}] [{}] {}\n",
            chrono::Utc::now().to_rfc3339(),
            level,
            message
        );
        if let Some(data) = data {
            match serde_json::to_string_pretty(data) {
                Ok(json) => {
                    line.push_str(&json);
                    line.push('\n');
                }
                Err(e) => tracing::warn!(error = %e, "failed to serialize log data"),
            }
        }

        if let Err(e) = self.append(EXECUTION_LOG, &line) {
            tracing::warn!(error = %e, "failed to write execution log");
        }
    }

    /// Appends one agent message to the JSONL transcript.
    pub fn log_message(&self, raw: &serde_json::Value) -> Result<()> {
        let mut line = serde_json::to_string(raw)
            .map_err(|e| Error::workspace_with("failed to serialize agent message", e))?;
        line.push('\n');
        self.append(MESSAGES_LOG, &line)
    }

    /// Writes `value` as pretty JSON to `name`.
    pub fn save_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| Error::workspace_with(format!("failed to serialize {}", name), e))?;
        self.save_text(name, &json)
    }

    /// Writes `text` to `name`, replacing any previous content.
    pub fn save_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, text).map_err(|e| {
            Error::workspace_with(format!("failed to write {}", path.display()), e)
        })?;
        Ok(path)
    }

    /// Reads an artifact back; `None` when it does not exist or is unreadable.
    pub fn read_text(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.path(name)).ok()
    }

    fn append(&self, name: &str, text: &str) -> Result<()> {
        let path = self.path(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::workspace_with(format!("failed to open {}", path.display()), e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| Error::workspace_with(format!("failed to write {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn run_log(root: &TempDir) -> RunLog {
        let run_id = RunId::parse("20250101-000000-00001").unwrap();
        RunLog::create(root.path(), "issue-apply", &run_id).unwrap()
    }

    #[test]
    fn creates_job_and_run_directories() {
        let root = TempDir::new().unwrap();
        let log = run_log(&root);

        assert_eq!(
            log.dir(),
            root.path().join("issue-apply").join("20250101-000000-00001")
        );
        assert!(log.dir().is_dir());
    }

    #[test]
    fn execution_log_lines_carry_level_and_data() {
        let root = TempDir::new().unwrap();
        let log = run_log(&root);

        log.info("starting");
        log.warn("slow");
        log.info_with("ticket", &json!({ "number": 42 }));

        let text = log.read_text(EXECUTION_LOG).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].contains("[INFO] starting"));
        assert!(lines[1].contains("[WARN] slow"));
        assert!(lines[2].contains("[INFO] ticket"));
        assert!(text.contains("\"number\": 42"));
    }

    #[test]
    fn messages_are_appended_as_json_lines() {
        let root = TempDir::new().unwrap();
        let log = run_log(&root);

        log.log_message(&json!({ "type": "system" })).unwrap();
        log.log_message(&json!({ "type": "result", "result": "ok" }))
            .unwrap();

        let text = log.read_text(MESSAGES_LOG).unwrap();
        let parsed: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["result"], "ok");
    }

    #[test]
    fn snapshots_round_trip() {
        let root = TempDir::new().unwrap();
        let log = run_log(&root);

        let path = log.save_json("result.json", &json!({ "ok": true })).unwrap();
        assert!(path.ends_with("result.json"));
        let saved: serde_json::Value =
            serde_json::from_str(&log.read_text("result.json").unwrap()).unwrap();
        assert_eq!(saved["ok"], true);

        log.save_text("prompt.txt", "hello").unwrap();
        assert_eq!(log.read_text("prompt.txt").as_deref(), Some("hello"));
        assert!(log.read_text("missing.txt").is_none());
    }
}
