use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::commands::{CommandReport, emit_json, read_json_file};
use crate::engine::cache::{FileCache, MemoryCache, ResponseCache};
use crate::engine::config::{EngineConfig, load_config};
use crate::engine::gateway::Gateway;
use crate::engine::paths::{EnginePaths, resolve_paths};
use crate::engine::pipeline::{
    BatchComplete, BatchHooks, BatchStart, RunContext, classify_candidates, plan_batches,
};
use crate::engine::prompt::prompt_signature;
use crate::engine::types::CandidateMessage;
use crate::providers::Provider;
use crate::providers::resolve::build_chain;

#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    pub candidates: PathBuf,
    pub out: Option<PathBuf>,
    pub no_cache: bool,
    pub dry_run: bool,
}

struct ProgressHooks;

impl BatchHooks for ProgressHooks {
    fn on_batch_start(&self, event: BatchStart) {
        tracing::info!(
            batch = event.batch_index + 1,
            total = event.total_batches,
            candidates = event.candidate_count,
            from_cache = event.from_cache,
            "batch started"
        );
    }

    fn on_batch_complete(&self, event: BatchComplete) {
        tracing::info!(
            batch = event.batch_index + 1,
            activities = event.activity_count,
            duration_ms = event.duration_ms,
            "batch complete"
        );
    }
}

fn open_cache(
    report: &mut CommandReport,
    cfg: &EngineConfig,
    paths: &EnginePaths,
) -> Box<dyn ResponseCache> {
    if cfg.cache.enabled {
        let signature = prompt_signature(&cfg.prompt.template_version);
        let file_cache = FileCache::new(&paths.cache_dir, &signature);
        report.detail(format!("cache_dir={}", file_cache.root().display()));
        Box::new(file_cache)
    } else {
        report.detail("cache=disabled");
        Box::new(MemoryCache::new())
    }
}

/// Plan batches without calling any provider. When a chain resolves,
/// each batch also reports its cache key and whether it is cached.
fn dry_run(
    report: &mut CommandReport,
    candidates: &[CandidateMessage],
    cfg: &EngineConfig,
    chain: Option<&[Box<dyn Provider>]>,
) -> Result<()> {
    let planned = match plan_batches(candidates, cfg) {
        Ok(planned) => planned,
        Err(err) => {
            report.issue(format!("{}: {err}", err.kind().as_str()));
            return Ok(());
        }
    };
    report.detail(format!("batches={}", planned.len()));

    let paths = resolve_paths()?;
    let cache = open_cache(report, cfg, &paths);
    let gateway = chain.map(|chain| Gateway::new(chain, cache.as_ref(), cfg.cache.ttl_secs));
    for p in &planned {
        let mut line = format!(
            "batch {}: type={} candidates={} estimated_tokens={}",
            p.batch.index + 1,
            p.batch.candidate_type.label(),
            p.batch.candidates.len(),
            p.batch.estimated_tokens
        );
        if let Some(gateway) = &gateway {
            match gateway.lookup(&p.batch) {
                Ok(lookup) => line.push_str(&format!(
                    " cache={} key={}",
                    if lookup.is_hit() { "hit" } else { "miss" },
                    lookup.key
                )),
                Err(err) => report.issue(format!("{}: {err}", err.kind().as_str())),
            }
        }
        report.detail(line);
    }
    Ok(())
}

pub fn run(opts: &ClassifyOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("classify");
    let candidates: Vec<CandidateMessage> = read_json_file(&opts.candidates)?;
    let mut cfg = load_config()?;
    if opts.no_cache {
        cfg.cache.enabled = false;
    }
    report.detail(format!("candidates={}", candidates.len()));

    let chain = build_chain(&cfg.providers);
    if opts.dry_run {
        dry_run(&mut report, &candidates, &cfg, chain.ok().as_deref())?;
        return Ok(report);
    }

    let chain = match chain {
        Ok(chain) => chain,
        Err(err) => {
            report.issue(format!("{}: {err}", err.kind().as_str()));
            return Ok(report);
        }
    };
    report.detail(format!(
        "providers={}",
        chain
            .iter()
            .map(|p| p.label())
            .collect::<Vec<_>>()
            .join(",")
    ));

    let paths = resolve_paths()?;
    let cache = open_cache(&mut report, &cfg, &paths);
    let ctx = RunContext {
        config: &cfg,
        chain: &chain,
        cache: cache.as_ref(),
        paths: Some(&paths),
        cancel: Arc::new(AtomicBool::new(false)),
    };

    match classify_candidates(&candidates, &ctx, &ProgressHooks) {
        Ok(outcome) => {
            report.detail(format!("batches={}", outcome.batch_count));
            report.detail(format!("cache_hits={}", outcome.cache_hits));
            report.detail(format!("activities={}", outcome.activities.len()));
            report.detail(format!("dropped={}", outcome.dropped));
            report.detail(format!(
                "usage.input_tokens={} usage.output_tokens={}",
                outcome.usage.input_tokens, outcome.usage.output_tokens
            ));
            emit_json(&mut report, &outcome.activities, opts.out.as_deref())?;
        }
        Err(err) => report.issue(format!("{}: {err}", err.kind().as_str())),
    }
    Ok(report)
}
