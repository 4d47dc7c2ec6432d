pub mod aggregate;
pub mod cache_prune;
pub mod classify;
pub mod providers;
pub mod verify;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    /// Document written to stdout when no output file was requested.
    #[serde(skip)]
    pub output: Option<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            output: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn merge(&mut self, mut other: CommandReport) {
        self.ok &= other.ok;
        self.details.append(&mut other.details);
        self.issues.append(&mut other.issues);
    }
}

/// Write `value` as pretty JSON to `out`, or stage it on the report for
/// stdout when no path is given.
pub fn emit_json<T: Serialize>(
    report: &mut CommandReport,
    value: &T,
    out: Option<&Path>,
) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            report.detail(format!("output={}", path.display()));
        }
        None => report.output = Some(rendered),
    }
    Ok(())
}

pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_flip_ok_and_merge_combines() {
        let mut report = CommandReport::new("verify");
        report.detail("config: ok");
        let mut other = CommandReport::new("providers");
        other.issue("missing key");
        report.merge(other);
        assert!(!report.ok);
        assert_eq!(report.details, vec!["config: ok".to_string()]);
        assert_eq!(report.issues, vec!["missing key".to_string()]);
    }

    #[test]
    fn emit_json_writes_file_or_stages_stdout() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut report = CommandReport::new("aggregate");
        emit_json(&mut report, &vec![1, 2], None).expect("stage");
        assert!(report.output.as_deref().is_some_and(|o| o.contains('1')));

        let path = tmp.path().join("nested").join("out.json");
        let mut report = CommandReport::new("aggregate");
        emit_json(&mut report, &vec![1, 2], Some(&path)).expect("write");
        assert!(report.output.is_none());
        let back: Vec<u32> = read_json_file(&path).expect("read back");
        assert_eq!(back, vec![1, 2]);
    }
}
