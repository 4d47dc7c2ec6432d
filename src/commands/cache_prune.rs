use anyhow::Result;

use crate::commands::CommandReport;
use crate::engine::cache::FileCache;
use crate::engine::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("cache-prune");
    let paths = resolve_paths()?;
    match FileCache::prune_expired(&paths.cache_dir) {
        Ok(removed) => {
            report.detail(format!("cache_dir={}", paths.cache_dir.display()));
            report.detail(format!("removed={removed}"));
        }
        Err(err) => report.issue(format!("cache prune failed: {err:#}")),
    }
    Ok(report)
}
