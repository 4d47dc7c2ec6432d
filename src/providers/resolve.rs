use crate::engine::config::ProvidersConfig;
use crate::error::{ClassifierError, ClassifierResult};
use crate::providers::Provider;
use crate::providers::remote::{RemoteClient, RemoteModelConfig, RemoteProvider};
use std::env;

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub fn parse_provider_alias(raw: &str) -> Option<RemoteProvider> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "openai" => Some(RemoteProvider::OpenAi),
        "anthropic" | "claude" => Some(RemoteProvider::Anthropic),
        "gemini" | "google" => Some(RemoteProvider::Gemini),
        "openai-compatible" | "compatible" | "deepseek" | "openrouter" => {
            Some(RemoteProvider::OpenAiCompatible)
        }
        _ => None,
    }
}

pub fn infer_provider_from_model(model: &str) -> Option<RemoteProvider> {
    let lower = model.trim().to_ascii_lowercase();
    if lower.starts_with("deepseek-") {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if lower.starts_with("claude-") {
        return Some(RemoteProvider::Anthropic);
    }
    if lower.starts_with("gemini-") {
        return Some(RemoteProvider::Gemini);
    }
    if lower.starts_with("gpt-")
        || lower.starts_with("o1")
        || lower.starts_with("o3")
        || lower.starts_with("o4")
    {
        return Some(RemoteProvider::OpenAi);
    }
    None
}

pub fn default_model_for_provider(provider: RemoteProvider) -> &'static str {
    match provider {
        RemoteProvider::OpenAi => "gpt-4.1-mini",
        RemoteProvider::Anthropic => "claude-3-5-haiku-latest",
        RemoteProvider::Gemini => "gemini-2.5-flash-lite",
        RemoteProvider::OpenAiCompatible => "deepseek-chat",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub provider: RemoteProvider,
    pub model: String,
    /// The provider alias as written in config (`openrouter`, `deepseek`, ...).
    pub alias: Option<String>,
}

/// Parse `provider:model`, a bare model name, or a bare provider alias.
pub fn parse_spec(raw: &str) -> Result<ProviderSpec, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty provider spec".to_string());
    }
    if let Some((prefix, model)) = trimmed.split_once(':')
        && let Some(provider) = parse_provider_alias(prefix)
    {
        let model = model.trim();
        return Ok(ProviderSpec {
            provider,
            model: if model.is_empty() {
                default_model_for_provider(provider).to_string()
            } else {
                model.to_string()
            },
            alias: Some(prefix.trim().to_ascii_lowercase()),
        });
    }
    if let Some(provider) = parse_provider_alias(trimmed) {
        return Ok(ProviderSpec {
            provider,
            model: default_model_for_provider(provider).to_string(),
            alias: Some(trimmed.to_ascii_lowercase()),
        });
    }
    if let Some(provider) = infer_provider_from_model(trimmed) {
        return Ok(ProviderSpec {
            provider,
            model: trimmed.to_string(),
            alias: None,
        });
    }
    Err(format!("cannot infer provider for `{trimmed}`"))
}

pub fn api_key_vars(provider: RemoteProvider) -> &'static [&'static str] {
    match provider {
        RemoteProvider::OpenAi => &["OPENAI_API_KEY"],
        RemoteProvider::Anthropic => &["ANTHROPIC_API_KEY"],
        RemoteProvider::Gemini => &["GEMINI_API_KEY"],
        RemoteProvider::OpenAiCompatible => {
            &["AI_API_KEY", "OPENROUTER_API_KEY", "DEEPSEEK_API_KEY"]
        }
    }
}

pub fn resolve_api_key(provider: RemoteProvider) -> Option<String> {
    resolve_api_key_source(provider).map(|(_, key)| key)
}

/// The first populated key variable for `provider`, with its value.
fn resolve_api_key_source(provider: RemoteProvider) -> Option<(&'static str, String)> {
    api_key_vars(provider)
        .iter()
        .find_map(|var| env_non_empty(var).map(|key| (*var, key)))
}

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Base URL for an OpenAI-compatible spec. An explicit override wins,
/// then the alias, then the variable that supplied the key, then the
/// model name.
fn compatible_base_url(
    spec: &ProviderSpec,
    base_override: Option<String>,
    key_var: Option<&str>,
) -> Option<String> {
    if base_override.is_some() {
        return base_override;
    }
    let vendor = match (spec.alias.as_deref(), key_var) {
        (Some("openrouter"), _) => Some(OPENROUTER_BASE_URL),
        (Some("deepseek"), _) => Some(DEEPSEEK_BASE_URL),
        (_, Some("OPENROUTER_API_KEY")) => Some(OPENROUTER_BASE_URL),
        (_, Some("DEEPSEEK_API_KEY")) => Some(DEEPSEEK_BASE_URL),
        _ if spec.model.trim().to_ascii_lowercase().starts_with("deepseek-") => {
            Some(DEEPSEEK_BASE_URL)
        }
        _ => None,
    };
    vendor.map(str::to_string)
}

pub fn resolve_compatible_base_url(spec: &ProviderSpec) -> Option<String> {
    let key_var = resolve_api_key_source(spec.provider).map(|(var, _)| var);
    compatible_base_url(spec, env_non_empty("AI_BASE_URL"), key_var)
}

/// Provider specs in effect: the configured chain, or every provider
/// with credentials present when the chain is empty.
pub fn effective_specs(cfg: &ProvidersConfig) -> ClassifierResult<Vec<ProviderSpec>> {
    if !cfg.chain.is_empty() {
        return cfg
            .chain
            .iter()
            .map(|raw| parse_spec(raw).map_err(ClassifierError::Config))
            .collect();
    }

    let detected: Vec<ProviderSpec> = [
        RemoteProvider::Anthropic,
        RemoteProvider::OpenAi,
        RemoteProvider::Gemini,
        RemoteProvider::OpenAiCompatible,
    ]
    .into_iter()
    .filter(|p| resolve_api_key(*p).is_some())
    .map(|provider| ProviderSpec {
        provider,
        model: env_non_empty("AI_MODEL")
            .filter(|m| infer_provider_from_model(m) == Some(provider))
            .unwrap_or_else(|| default_model_for_provider(provider).to_string()),
        alias: None,
    })
    .collect();

    if detected.is_empty() {
        return Err(ClassifierError::Config(
            "no provider configured; set CHATTODO_PROVIDERS or an API key such as ANTHROPIC_API_KEY"
                .to_string(),
        ));
    }
    Ok(detected)
}

pub fn build_chain(cfg: &ProvidersConfig) -> ClassifierResult<Vec<Box<dyn Provider>>> {
    let mut chain: Vec<Box<dyn Provider>> = Vec::new();
    for spec in effective_specs(cfg)? {
        let api_key = resolve_api_key(spec.provider).ok_or_else(|| {
            ClassifierError::Config(format!(
                "missing provider credentials for {}; set {}",
                spec.provider.label(),
                api_key_vars(spec.provider).join(" or ")
            ))
        })?;
        let base_url = match spec.provider {
            RemoteProvider::OpenAiCompatible => resolve_compatible_base_url(&spec),
            _ => None,
        };
        let client = RemoteClient::new(RemoteModelConfig {
            provider: spec.provider,
            model: spec.model,
            api_key,
            base_url,
            timeout_secs: cfg.request_timeout_secs,
            max_output_tokens: cfg.max_output_tokens,
        })?;
        chain.push(Box::new(client));
    }
    Ok(chain)
}
