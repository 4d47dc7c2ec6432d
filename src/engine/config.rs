use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_candidates: usize,
    pub max_prompt_tokens: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            max_prompt_tokens: 24_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Ordered `provider:model` specs; the first is primary, the rest are
    /// rate-limit fallbacks. Empty means auto-detect from API keys.
    pub chain: Vec<String>,
    pub request_timeout_secs: u64,
    pub max_output_tokens: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            chain: Vec::new(),
            request_timeout_secs: 120,
            max_output_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub title_similarity: f64,
    pub place_similarity: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            title_similarity: 0.95,
            place_similarity: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub concurrency: usize,
    pub request_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            request_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub template_version: String,
    pub home_country: Option<String>,
    pub timezone: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template_version: "v1".to_string(),
            home_country: None,
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub batch: BatchConfig,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub aggregate: AggregateConfig,
    pub run: RunConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialEngineConfig {
    batch: Option<BatchConfig>,
    providers: Option<ProvidersConfig>,
    cache: Option<CacheConfig>,
    aggregate: Option<AggregateConfig>,
    run: Option<RunConfig>,
    prompt: Option<PromptConfig>,
}

fn env_or_f64(var: &str, fallback: f64) -> f64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<f64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

fn in_unit_range(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

pub fn validate(cfg: &EngineConfig) -> Result<()> {
    if cfg.batch.max_candidates == 0 {
        return Err(anyhow!("invalid batch size: must be >= 1"));
    }
    if cfg.batch.max_prompt_tokens == 0 {
        return Err(anyhow!("invalid prompt token ceiling: must be >= 1"));
    }
    if !in_unit_range(cfg.aggregate.title_similarity) {
        return Err(anyhow!(
            "invalid title similarity: require 0 < title_similarity <= 1.0"
        ));
    }
    if !in_unit_range(cfg.aggregate.place_similarity) {
        return Err(anyhow!(
            "invalid place similarity: require 0 < place_similarity <= 1.0"
        ));
    }
    if cfg.run.concurrency == 0 {
        return Err(anyhow!("invalid concurrency: must be >= 1"));
    }
    if cfg.providers.request_timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    if cfg.prompt.template_version.trim().is_empty() {
        return Err(anyhow!("invalid template version: cannot be empty"));
    }
    for spec in &cfg.providers.chain {
        crate::providers::resolve::parse_spec(spec)
            .map_err(|err| anyhow!("invalid provider chain entry `{spec}`: {err}"))?;
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHATTODO_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".chat-todo").join("config.toml"))
}

fn merge_file_config(base: &mut EngineConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialEngineConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(batch) = parsed.batch {
        base.batch = batch;
    }
    if let Some(providers) = parsed.providers {
        base.providers = providers;
    }
    if let Some(cache) = parsed.cache {
        base.cache = cache;
    }
    if let Some(aggregate) = parsed.aggregate {
        base.aggregate = aggregate;
    }
    if let Some(run) = parsed.run {
        base.run = run;
    }
    if let Some(prompt) = parsed.prompt {
        base.prompt = prompt;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut EngineConfig) {
    cfg.batch.max_candidates = env_or_usize("CHATTODO_BATCH_SIZE", cfg.batch.max_candidates);
    cfg.batch.max_prompt_tokens =
        env_or_usize("CHATTODO_MAX_PROMPT_TOKENS", cfg.batch.max_prompt_tokens);
    cfg.providers.chain = env_or_csv("CHATTODO_PROVIDERS", &cfg.providers.chain);
    cfg.providers.request_timeout_secs = env_or_u64(
        "CHATTODO_REQUEST_TIMEOUT_SECS",
        cfg.providers.request_timeout_secs,
    );
    cfg.providers.max_output_tokens =
        env_or_u64("CHATTODO_MAX_OUTPUT_TOKENS", cfg.providers.max_output_tokens);
    cfg.cache.enabled = env_or_bool("CHATTODO_CACHE_ENABLED", cfg.cache.enabled);
    cfg.cache.ttl_secs = env_or_u64("CHATTODO_CACHE_TTL_SECS", cfg.cache.ttl_secs);
    cfg.aggregate.title_similarity =
        env_or_f64("CHATTODO_TITLE_SIMILARITY", cfg.aggregate.title_similarity);
    cfg.aggregate.place_similarity =
        env_or_f64("CHATTODO_PLACE_SIMILARITY", cfg.aggregate.place_similarity);
    cfg.run.concurrency = env_or_usize("CHATTODO_CONCURRENCY", cfg.run.concurrency);
    cfg.run.request_delay_ms = env_or_u64("CHATTODO_REQUEST_DELAY_MS", cfg.run.request_delay_ms);
    cfg.prompt.template_version =
        env_or_string("CHATTODO_TEMPLATE_VERSION", &cfg.prompt.template_version);
    cfg.prompt.home_country =
        env_or_optional("CHATTODO_HOME_COUNTRY", cfg.prompt.home_country.take());
    cfg.prompt.timezone = env_or_optional("CHATTODO_TIMEZONE", cfg.prompt.timezone.take());
}

pub fn load_config() -> Result<EngineConfig> {
    let mut cfg = EngineConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        validate(&cfg).expect("defaults validate");
        assert_eq!(cfg.aggregate.title_similarity, 0.95);
        assert_eq!(cfg.aggregate.place_similarity, 0.95);
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.aggregate.title_similarity = 1.5;
        assert!(validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.aggregate.place_similarity = 0.0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_zero_sizes_and_unknown_providers() {
        let mut cfg = EngineConfig::default();
        cfg.batch.max_candidates = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.run.concurrency = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.providers.chain = vec!["mystery:model-x".into()];
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn a_single_key_overrides_only_that_field() {
        let raw = r#"
[batch]
max_candidates = 4

[aggregate]
place_similarity = 0.9

[prompt]
home_country = "New Zealand"
"#;
        let parsed: PartialEngineConfig = toml::from_str(raw).expect("parse toml");
        let batch = parsed.batch.expect("batch section");
        assert_eq!(batch.max_candidates, 4);
        assert_eq!(batch.max_prompt_tokens, 24_000);
        let aggregate = parsed.aggregate.expect("aggregate section");
        assert_eq!(aggregate.title_similarity, 0.95);
        assert_eq!(aggregate.place_similarity, 0.9);
        let prompt = parsed.prompt.expect("prompt section");
        assert_eq!(prompt.template_version, "v1");
        assert_eq!(prompt.home_country.as_deref(), Some("New Zealand"));
    }

    #[test]
    fn partial_toml_keeps_untouched_sections() {
        let raw = r#"
[batch]
max_candidates = 4
max_prompt_tokens = 9000

[providers]
chain = ["anthropic:claude-3-5-haiku-latest", "openai:gpt-4.1-mini"]
"#;
        let parsed: PartialEngineConfig = toml::from_str(raw).expect("parse toml");
        let mut cfg = EngineConfig::default();
        if let Some(batch) = parsed.batch {
            cfg.batch = batch;
        }
        if let Some(providers) = parsed.providers {
            cfg.providers = providers;
        }
        assert_eq!(cfg.batch.max_candidates, 4);
        assert_eq!(cfg.providers.chain.len(), 2);
        assert_eq!(cfg.providers.request_timeout_secs, 120);
        assert!(parsed.cache.is_none());
        assert!(cfg.cache.enabled);
        validate(&cfg).expect("merged config validates");
    }
}
