pub mod remote;
pub mod resolve;

use crate::engine::types::TokenUsage;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    Network,
    Auth,
    InvalidRequest,
    InvalidResponse,
}

impl ProviderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidResponse => "invalid_response",
        }
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::Auth,
            400..=499 => Self::InvalidRequest,
            _ => Self::Network,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, provider: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == ProviderErrorKind::RateLimit
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error from {}: {}",
            self.kind.as_str(),
            self.provider,
            self.message
        )
    }
}

impl std::error::Error for ProviderError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// One configured model at one vendor. Implementations own every
/// vendor-specific detail; callers only see text, usage, and the error kind.
pub trait Provider: Send + Sync {
    /// Vendor label, e.g. `anthropic`.
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn send(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;

    fn label(&self) -> String {
        format!("{}/{}", self.name(), self.model())
    }
}

pub(crate) fn find_u64_paths(root: &Value, paths: &[&[&str]]) -> Option<u64> {
    for path in paths {
        let mut cursor = root;
        let mut found = true;
        for part in *path {
            let Some(next) = cursor.get(*part) else {
                found = false;
                break;
            };
            cursor = next;
        }
        if found && let Some(value) = cursor.as_u64() {
            return Some(value);
        }
    }
    None
}

pub(crate) fn extract_usage(json: &Value) -> TokenUsage {
    TokenUsage {
        input_tokens: find_u64_paths(
            json,
            &[
                &["usage", "input_tokens"],
                &["usage", "prompt_tokens"],
                &["usageMetadata", "promptTokenCount"],
            ],
        )
        .unwrap_or(0),
        output_tokens: find_u64_paths(
            json,
            &[
                &["usage", "output_tokens"],
                &["usage", "completion_tokens"],
                &["usageMetadata", "candidatesTokenCount"],
            ],
        )
        .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimit);
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(403), ProviderErrorKind::Auth);
        assert_eq!(
            ProviderErrorKind::from_status(400),
            ProviderErrorKind::InvalidRequest
        );
        assert_eq!(ProviderErrorKind::from_status(503), ProviderErrorKind::Network);
    }

    #[test]
    fn usage_reads_every_vendor_shape() {
        let anthropic = json!({"usage": {"input_tokens": 120, "output_tokens": 30}});
        assert_eq!(
            extract_usage(&anthropic),
            TokenUsage {
                input_tokens: 120,
                output_tokens: 30
            }
        );

        let compatible = json!({"usage": {"prompt_tokens": 50, "completion_tokens": 5}});
        assert_eq!(extract_usage(&compatible).input_tokens, 50);
        assert_eq!(extract_usage(&compatible).output_tokens, 5);

        let gemini = json!({"usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 4}});
        assert_eq!(extract_usage(&gemini).input_tokens, 9);
        assert_eq!(extract_usage(&gemini).output_tokens, 4);

        assert_eq!(extract_usage(&json!({})), TokenUsage::default());
    }
}
