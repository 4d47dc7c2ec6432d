use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, emit_json, read_json_file};
use crate::engine::aggregate::aggregate;
use crate::engine::config::load_config;
use crate::engine::types::ClassifiedActivity;

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub activities: PathBuf,
    pub out: Option<PathBuf>,
}

pub fn run(opts: &AggregateOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("aggregate");
    let activities: Vec<ClassifiedActivity> = read_json_file(&opts.activities)?;
    if let Some(bad) = activities.iter().find(|a| a.messages.is_empty()) {
        report.issue(format!(
            "activity `{}` has no source messages",
            bad.activity
        ));
        return Ok(report);
    }

    let cfg = load_config()?;
    let before = activities.len();
    let merged = aggregate(activities, &cfg.aggregate);
    report.detail(format!("input={before}"));
    report.detail(format!("activities={}", merged.len()));
    report.detail(format!("merged={}", before - merged.len()));
    emit_json(&mut report, &merged, opts.out.as_deref())?;
    Ok(report)
}
