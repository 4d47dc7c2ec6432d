use crate::providers::{
    Provider, ProviderError, ProviderErrorKind, ProviderResponse, extract_usage,
};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProvider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenAiCompatible,
}

impl RemoteProvider {
    pub fn label(self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "openai",
            RemoteProvider::Anthropic => "anthropic",
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAiCompatible => "openai-compatible",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteModelConfig {
    pub provider: RemoteProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_output_tokens: u64,
}

/// HTTP-backed provider for any of the supported vendors.
pub struct RemoteClient {
    config: RemoteModelConfig,
    client: Client,
}

impl RemoteClient {
    pub fn new(config: RemoteModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| {
                ProviderError::new(
                    ProviderErrorKind::Network,
                    config.provider.label(),
                    format!("failed to build http client: {err}"),
                )
            })?;
        Ok(Self { config, client })
    }

    fn error(&self, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::new(kind, &self.label(), message)
    }

    fn request(&self, prompt: &str) -> RequestBuilder {
        let cfg = &self.config;
        match cfg.provider {
            RemoteProvider::OpenAi => self
                .client
                .post("https://api.openai.com/v1/responses")
                .bearer_auth(&cfg.api_key)
                .json(&serde_json::json!({
                    "model": cfg.model,
                    "input": prompt,
                    "temperature": 0.2,
                    "max_output_tokens": cfg.max_output_tokens,
                })),
            RemoteProvider::Anthropic => self
                .client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", &cfg.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&serde_json::json!({
                    "model": cfg.model,
                    "max_tokens": cfg.max_output_tokens,
                    "temperature": 0.2,
                    "messages": [
                        {"role": "user", "content": prompt}
                    ]
                })),
            RemoteProvider::Gemini => {
                let url = format!(
                    "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                    cfg.model
                );
                self.client
                    .post(url)
                    .header("x-goog-api-key", &cfg.api_key)
                    .json(&serde_json::json!({
                        "contents": [
                            {"parts": [{"text": prompt}]}
                        ],
                        "generationConfig": {
                            "temperature": 0.2,
                            "maxOutputTokens": cfg.max_output_tokens
                        }
                    }))
            }
            RemoteProvider::OpenAiCompatible => {
                let base = cfg
                    .base_url
                    .as_deref()
                    .unwrap_or("https://api.openai.com")
                    .trim_end_matches('/');
                self.client
                    .post(format!("{base}/v1/chat/completions"))
                    .bearer_auth(&cfg.api_key)
                    .json(&serde_json::json!({
                        "model": cfg.model,
                        "messages": [
                            {"role": "user", "content": prompt}
                        ],
                        "temperature": 0.2,
                        "max_tokens": cfg.max_output_tokens
                    }))
            }
        }
    }

    fn extract_text(&self, json: &Value) -> Option<String> {
        match self.config.provider {
            RemoteProvider::OpenAi => extract_openai_text(json),
            RemoteProvider::Anthropic => extract_anthropic_text(json),
            RemoteProvider::Gemini => extract_gemini_text(json),
            RemoteProvider::OpenAiCompatible => extract_openai_compatible_text(json),
        }
    }
}

impl Provider for RemoteClient {
    fn name(&self) -> &str {
        self.config.provider.label()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn send(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .request(prompt)
            .send()
            .map_err(|err| self.error(ProviderErrorKind::Network, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(self.error(
                ProviderErrorKind::from_status(status.as_u16()),
                format!("call failed with status {status}: {snippet}"),
            ));
        }

        let json: Value = response.json().map_err(|err| {
            self.error(
                ProviderErrorKind::InvalidResponse,
                format!("response body is not json: {err}"),
            )
        })?;
        let text = self.extract_text(&json).ok_or_else(|| {
            self.error(
                ProviderErrorKind::InvalidResponse,
                "response missing text content",
            )
        })?;
        Ok(ProviderResponse {
            text,
            usage: extract_usage(&json),
        })
    }
}

fn join_text_parts(parts: &[Value]) -> Option<String> {
    let chunks: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_openai_text(json: &Value) -> Option<String> {
    if let Some(text) = json.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    let mut chunks = Vec::new();
    let output = json.get("output").and_then(Value::as_array)?;
    for item in output {
        let Some(content) = item.get("content").and_then(Value::as_array) else {
            continue;
        };
        if let Some(text) = join_text_parts(content) {
            chunks.push(text);
        }
    }

    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    let content = json.get("content").and_then(Value::as_array)?;
    join_text_parts(content)
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)?;
    join_text_parts(parts)
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let first = choices.first()?;
    let content = first.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => join_text_parts(parts),
        _ => None,
    }
}
