use crate::engine::aggregate::aggregate;
use crate::engine::audit::{AuditLog, Phase, Status};
use crate::engine::batch::{Batch, build_batches};
use crate::engine::cache::ResponseCache;
use crate::engine::config::EngineConfig;
use crate::engine::gateway::{BatchResult, Gateway};
use crate::engine::paths::EnginePaths;
use crate::engine::prompt::{PromptContext, build_prompt, estimate_tokens};
use crate::engine::types::{CandidateMessage, ClassifiedActivity, TokenUsage};
use crate::error::{ClassifierError, ClassifierResult};
use crate::providers::Provider;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStart {
    pub batch_index: usize,
    pub total_batches: usize,
    pub candidate_count: usize,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchComplete {
    pub batch_index: usize,
    pub activity_count: usize,
    pub duration_ms: u64,
}

/// Progress callbacks. Called from worker threads; `on_batch_complete`
/// only fires for batches that succeeded.
pub trait BatchHooks: Sync {
    fn on_batch_start(&self, _event: BatchStart) {}
    fn on_batch_complete(&self, _event: BatchComplete) {}
}

pub struct NoopHooks;

impl BatchHooks for NoopHooks {}

pub struct RunContext<'a> {
    pub config: &'a EngineConfig,
    pub chain: &'a [Box<dyn Provider>],
    pub cache: &'a dyn ResponseCache,
    /// Where to append audit events; `None` disables the audit trail.
    pub paths: Option<&'a EnginePaths>,
    pub cancel: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct PlannedBatch {
    pub batch: Batch,
    pub prompt: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
    pub activities: Vec<ClassifiedActivity>,
    pub usage: TokenUsage,
    pub batch_count: usize,
    pub cache_hits: usize,
    pub dropped: usize,
}

pub fn prompt_context(cfg: &EngineConfig) -> PromptContext {
    PromptContext {
        home_country: cfg.prompt.home_country.clone(),
        timezone: cfg.prompt.timezone.clone(),
    }
}

/// Build batches and render their prompts. Fails before any provider
/// call when a batch renders over the token ceiling.
pub fn plan_batches(
    candidates: &[CandidateMessage],
    cfg: &EngineConfig,
) -> ClassifierResult<Vec<PlannedBatch>> {
    let ctx = prompt_context(cfg);
    let batches = build_batches(
        candidates,
        cfg.batch.max_candidates,
        cfg.batch.max_prompt_tokens,
        |kind, chunk| estimate_tokens(&build_prompt(kind, chunk, &ctx)),
    )?;
    Ok(batches
        .into_iter()
        .map(|batch| {
            let prompt = build_prompt(batch.candidate_type, &batch.candidates, &ctx);
            PlannedBatch { batch, prompt }
        })
        .collect())
}

fn record_audit(paths: Option<&EnginePaths>, phase: Phase, status: Status, message: &str) {
    let Some(paths) = paths else {
        return;
    };
    if let Err(err) = AuditLog::new(paths).record(phase, status, message) {
        tracing::warn!(error = %format!("{err:#}"), "failed to append audit event");
    }
}

fn run_batch(
    planned: &PlannedBatch,
    total_batches: usize,
    gateway: &Gateway<'_>,
    ctx: &RunContext<'_>,
    hooks: &dyn BatchHooks,
) -> ClassifierResult<BatchResult> {
    let batch = &planned.batch;
    let started = Instant::now();
    let lookup = gateway.lookup(batch)?;
    let from_cache = lookup.is_hit();
    hooks.on_batch_start(BatchStart {
        batch_index: batch.index,
        total_batches,
        candidate_count: batch.candidates.len(),
        from_cache,
    });
    tracing::debug!(
        batch = batch.index + 1,
        total = total_batches,
        kind = batch.candidate_type.label(),
        candidates = batch.candidates.len(),
        from_cache,
        "dispatching batch"
    );

    let outcome = gateway.classify_with_lookup(batch, &planned.prompt, lookup);
    let duration_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(result) => {
            let status = if result.from_cache {
                Status::CacheHit
            } else {
                Status::Ok
            };
            record_audit(
                ctx.paths,
                Phase::Batch,
                status,
                &format!(
                    "batch {}/{} provider={} activities={} dropped={} input_tokens={} output_tokens={}",
                    batch.index + 1,
                    total_batches,
                    result.provider,
                    result.activities.len(),
                    result.dropped.len(),
                    result.usage.input_tokens,
                    result.usage.output_tokens
                ),
            );
            hooks.on_batch_complete(BatchComplete {
                batch_index: batch.index,
                activity_count: result.activities.len(),
                duration_ms,
            });
            if !result.from_cache && ctx.config.run.request_delay_ms > 0 {
                thread::sleep(Duration::from_millis(ctx.config.run.request_delay_ms));
            }
        }
        Err(err) => record_audit(
            ctx.paths,
            Phase::Batch,
            Status::Failed,
            &format!(
                "batch {}/{} {}: {err}",
                batch.index + 1,
                total_batches,
                err.kind().as_str()
            ),
        ),
    }
    outcome
}

fn dispatch(
    planned: &[PlannedBatch],
    ctx: &RunContext<'_>,
    hooks: &dyn BatchHooks,
) -> ClassifierResult<Vec<BatchResult>> {
    let total = planned.len();
    let gateway = Gateway::new(ctx.chain, ctx.cache, ctx.config.cache.ttl_secs);
    let workers = ctx.config.run.concurrency.clamp(1, total.max(1));
    let next = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let slots: Mutex<Vec<Option<BatchResult>>> = Mutex::new(vec![None; total]);
    let failures: Mutex<Vec<(usize, ClassifierError)>> = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    if abort.load(Ordering::SeqCst) || ctx.cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = planned.get(i) else {
                        break;
                    };
                    match run_batch(item, total, &gateway, ctx, hooks) {
                        Ok(result) => {
                            if let Ok(mut slots) = slots.lock() {
                                slots[i] = Some(result);
                            }
                        }
                        Err(err) => {
                            abort.store(true, Ordering::SeqCst);
                            if let Ok(mut failures) = failures.lock() {
                                failures.push((i, err));
                            }
                            break;
                        }
                    }
                }
            });
        }
    });

    let mut failures = failures
        .into_inner()
        .map_err(|_| ClassifierError::Cancelled)?;
    failures.sort_by_key(|(i, _)| *i);
    if let Some((_, err)) = failures.into_iter().next() {
        return Err(err);
    }

    let slots = slots.into_inner().map_err(|_| ClassifierError::Cancelled)?;
    // A missing slot without a failure means the run was cancelled.
    slots
        .into_iter()
        .map(|slot| slot.ok_or(ClassifierError::Cancelled))
        .collect()
}

/// Classify candidates end to end: batch, dispatch on a bounded worker
/// pool, validate, and aggregate. Any batch failure aborts the whole run
/// and no partial result is returned.
pub fn classify_candidates(
    candidates: &[CandidateMessage],
    ctx: &RunContext<'_>,
    hooks: &dyn BatchHooks,
) -> ClassifierResult<ClassificationOutcome> {
    let planned = plan_batches(candidates, ctx.config)?;
    if ctx.cancel.load(Ordering::SeqCst) {
        return Err(ClassifierError::Cancelled);
    }

    let result = dispatch(&planned, ctx, hooks);
    let results = match result {
        Ok(results) => results,
        Err(err) => {
            record_audit(
                ctx.paths,
                Phase::Classify,
                Status::Failed,
                &format!("{}: {err}", err.kind().as_str()),
            );
            return Err(err);
        }
    };

    let mut outcome = ClassificationOutcome {
        batch_count: planned.len(),
        ..ClassificationOutcome::default()
    };
    let mut flat = Vec::new();
    for result in results {
        outcome.usage.add(result.usage);
        outcome.cache_hits += usize::from(result.from_cache);
        outcome.dropped += result.dropped.len();
        flat.extend(result.activities);
    }
    let classified = flat.len();
    outcome.activities = aggregate(flat, &ctx.config.aggregate);

    tracing::info!(
        batches = outcome.batch_count,
        cache_hits = outcome.cache_hits,
        classified,
        activities = outcome.activities.len(),
        dropped = outcome.dropped,
        input_tokens = outcome.usage.input_tokens,
        output_tokens = outcome.usage.output_tokens,
        "classification complete"
    );
    record_audit(
        ctx.paths,
        Phase::Classify,
        Status::Ok,
        &format!(
            "candidates={} batches={} cache_hits={} classified={} activities={} dropped={}",
            candidates.len(),
            outcome.batch_count,
            outcome.cache_hits,
            classified,
            outcome.activities.len(),
            outcome.dropped
        ),
    );
    Ok(outcome)
}
