use anyhow::Result;
use std::collections::BTreeSet;
use std::env;

use crate::commands::{CommandReport, providers};
use crate::engine::config::{load_config, resolve_config_path};
use crate::engine::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/chattodo_env_allowlist.rs"));

const ENV_PREFIX: &str = "CHATTODO_";

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub strict: bool,
}

fn unknown_env_keys<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let known: BTreeSet<&str> = GENERATED_ENV_ALLOWLIST.iter().copied().collect();
    let mut unknown: Vec<String> = keys
        .into_iter()
        .filter(|k| k.starts_with(ENV_PREFIX) && !known.contains(k.as_str()))
        .collect();
    unknown.sort();
    unknown
}

pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("verify");

    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_file={}", path.display())),
        Some(path) => report.detail(format!("config_file={} (absent, using defaults)", path.display())),
        None => report.detail("config_file=none"),
    }

    match resolve_paths() {
        Ok(paths) => report.detail(format!(
            "home={} cache_dir={} logs_dir={}",
            paths.home.display(),
            paths.cache_dir.display(),
            paths.logs_dir.display()
        )),
        Err(err) => report.issue(format!("paths unresolved: {err:#}")),
    }

    match load_config() {
        Ok(cfg) => {
            report.detail("config: ok");
            report.detail(format!(
                "batch.max_candidates={} batch.max_prompt_tokens={} run.concurrency={} cache.enabled={}",
                cfg.batch.max_candidates,
                cfg.batch.max_prompt_tokens,
                cfg.run.concurrency,
                cfg.cache.enabled
            ));
            report.merge(providers::check(&cfg.providers));
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    for key in unknown_env_keys(env::vars().map(|(k, _)| k)) {
        if opts.strict {
            report.issue(format!("unknown environment variable {key}"));
        } else {
            report.detail(format!("warning: unknown environment variable {key}"));
        }
    }

    if opts.strict && !report.ok {
        report.issue("strict verify failed");
    }

    Ok(report)
}
