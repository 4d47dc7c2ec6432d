use crate::engine::paths::EnginePaths;
use crate::engine::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Batch,
    Classify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Ok,
    CacheHit,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub at_epoch_secs: u64,
    pub phase: Phase,
    pub status: Status,
    pub message: &'a str,
}

/// Append-only JSON-lines trail at `<logs_dir>/audit.log`.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(paths: &EnginePaths) -> Self {
        Self {
            path: paths.audit_log(),
        }
    }

    pub fn record(&self, phase: Phase, status: Status, message: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let mut line = serde_json::to_string(&AuditEvent {
            at_epoch_secs: now_epoch_secs()?,
            phase,
            status,
            message,
        })?;
        line.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn record_writes_one_json_line_per_event() {
        let tmp = tempdir().expect("tempdir");
        let paths = EnginePaths {
            home: tmp.path().to_path_buf(),
            cache_dir: tmp.path().join("cache"),
            logs_dir: tmp.path().join("logs"),
        };
        let log = AuditLog::new(&paths);
        log.record(Phase::Batch, Status::CacheHit, "batch 1/2 activities=3")
            .expect("append");
        log.record(Phase::Classify, Status::Ok, "done").expect("append");

        let raw = fs::read_to_string(paths.audit_log()).expect("read audit");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(first["phase"], "batch");
        assert_eq!(first["status"], "cache-hit");
        assert_eq!(first["message"], "batch 1/2 activities=3");
    }
}
