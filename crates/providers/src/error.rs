//! Normalized provider failure taxonomy.

use genflow_core::{Classify, ErrorClass};
use thiserror::Error;

/// A failure talking to a generation provider, already mapped out of the
/// provider's native code family.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Connection reset, DNS failure, request timeout.
    #[error("network error: {0}")]
    Network(String),

    /// 5xx or provider-side maintenance.
    #[error("provider unavailable (code {code}): {message}")]
    Unavailable { code: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("insufficient credits: {0}")]
    Quota(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("content policy violation: {0}")]
    ContentPolicy(String),

    /// The provider answered with something neither adapter understands.
    #[error("unexpected provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Map a provider envelope code (or bare HTTP status) into the taxonomy.
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            401 | 403 => ProviderError::Auth(message),
            402 => ProviderError::Quota(message),
            429 => ProviderError::RateLimited(message),
            451 => ProviderError::ContentPolicy(message),
            455 | 500..=599 => ProviderError::Unavailable { code, message },
            400..=499 if mentions_content_policy(&message) => ProviderError::ContentPolicy(message),
            400..=499 => ProviderError::InvalidParameters(message),
            _ => ProviderError::Unavailable { code, message },
        }
    }
}

impl Classify for ProviderError {
    fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Network(_) | ProviderError::Unavailable { .. } => ErrorClass::Transient,
            ProviderError::RateLimited(_) => ErrorClass::RateLimited,
            ProviderError::Auth(_)
            | ProviderError::Quota(_)
            | ProviderError::InvalidParameters(_)
            | ProviderError::ContentPolicy(_)
            | ProviderError::MalformedResponse(_) => ErrorClass::Fatal,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ProviderError::from_code(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return ProviderError::MalformedResponse(err.to_string());
        }
        ProviderError::Network(err.to_string())
    }
}

/// Heuristic used for providers that report policy blocks as generic 4xx
/// codes or failed-job messages.
pub(crate) fn mentions_content_policy(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["content policy", "sensitive", "violat", "nsfw", "flagged", "prohibited"]
        .iter()
        .any(|needle| lower.contains(needle))
}
