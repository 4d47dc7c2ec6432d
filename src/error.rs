use thiserror::Error;

use crate::providers::{ProviderError, ProviderErrorKind};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited by every configured provider ({})", .providers.join(", "))]
    RateLimit { providers: Vec<String> },
    #[error("network failure from {provider}: {message}")]
    Network { provider: String, message: String },
    #[error("authentication failed for {provider}: {message}")]
    Auth { provider: String, message: String },
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
    #[error("could not parse model output: {0}")]
    Parse(String),
    #[error("model output failed validation: {0}")]
    Validation(String),
    #[error("offset {offset} is out of range (available context: {available})")]
    InvalidOffset { offset: i64, available: usize },
    #[error("response cache failure: {0}")]
    Cache(String),
    #[error("classification cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    RateLimit,
    Network,
    Auth,
    InvalidResponse,
    Parse,
    Validation,
    InvalidOffset,
    Cache,
    Cancelled,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::InvalidResponse => "invalid_response",
            Self::Parse => "parse_error",
            Self::Validation => "validation_error",
            Self::InvalidOffset => "invalid_offset",
            Self::Cache => "cache",
            Self::Cancelled => "cancelled",
            Self::Config => "config",
        }
    }
}

impl ClassifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Network { .. } => ErrorKind::Network,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidOffset { .. } => ErrorKind::InvalidOffset,
            Self::Cache(_) => ErrorKind::Cache,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<ProviderError> for ClassifierError {
    fn from(err: ProviderError) -> Self {
        let ProviderError {
            kind,
            provider,
            message,
        } = err;
        match kind {
            ProviderErrorKind::RateLimit => Self::RateLimit {
                providers: vec![provider],
            },
            ProviderErrorKind::Network => Self::Network { provider, message },
            ProviderErrorKind::Auth => Self::Auth { provider, message },
            ProviderErrorKind::InvalidRequest => {
                Self::InvalidRequest(format!("{provider} rejected the request: {message}"))
            }
            ProviderErrorKind::InvalidResponse => Self::InvalidResponse { provider, message },
        }
    }
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;
