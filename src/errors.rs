/*!
 * Error types for the wikitranslate crate.
 *
 * Provider back-ends fail with a `ProviderError`, whose kind decides whether the
 * cascade retries in place or moves on. Everything the orchestration core can run
 * into is a `TranslationError`; only `AllProvidersExhausted` (per segment) and
 * `BatchCancelled` (per batch) ever reach a caller as hard failures, the rest are
 * absorbed with a degraded result.
 */

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::translation::segment::SegmentResult;

/// Failure classes reported by translation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The provider did not answer in time
    Timeout,
    /// The provider throttled the request
    RateLimited,
    /// Credentials were missing or rejected
    AuthError,
    /// The provider refused the request as malformed or unsupported
    InvalidRequest,
    /// Anything else: transport failures, 5xx responses, unreadable bodies
    Unknown,
}

impl ProviderErrorKind {
    /// Whether the cascade should retry the same provider after this failure
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Unknown)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::AuthError => "auth_error",
            Self::InvalidRequest => "invalid_request",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when calling a provider API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// The provider rejected the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unclassified failure
    #[error("Provider failure: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Build an error of the given kind
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ProviderErrorKind::Timeout => Self::Timeout(message),
            ProviderErrorKind::RateLimited => Self::RateLimited(message),
            ProviderErrorKind::AuthError => Self::AuthError(message),
            ProviderErrorKind::InvalidRequest => Self::InvalidRequest(message),
            ProviderErrorKind::Unknown => Self::Unknown(message),
        }
    }

    /// The failure class of this error
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Timeout(_) => ProviderErrorKind::Timeout,
            Self::RateLimited(_) => ProviderErrorKind::RateLimited,
            Self::AuthError(_) => ProviderErrorKind::AuthError,
            Self::InvalidRequest(_) => ProviderErrorKind::InvalidRequest,
            Self::Unknown(_) => ProviderErrorKind::Unknown,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classify an HTTP error status returned by a provider
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        match status {
            401 | 403 => Self::AuthError(message),
            400 | 404 | 413 | 422 => Self::InvalidRequest(message),
            429 => Self::RateLimited(message),
            408 | 504 => Self::Timeout(message),
            _ => Self::Unknown(message),
        }
    }
}

/// Raised when translated text comes back without every placeholder it was sent with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} placeholder(s) missing after translation: {}", .missing.len(), .missing.join(", "))]
pub struct RestorationMismatch {
    /// Placeholder tokens that never came back
    pub missing: Vec<String>,
    /// Best-effort text: surviving placeholders restored, residue stripped
    pub degraded: String,
}

/// A cache tier could not be read or written
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cache tier '{tier}' unavailable: {message}")]
pub struct CacheUnavailable {
    /// Name of the failing tier
    pub tier: String,
    /// Underlying failure
    pub message: String,
}

/// Errors that can occur while translating one segment
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// A provider failed in a way worth retrying in place
    #[error("Transient failure from provider '{provider}': {error}")]
    Transient {
        /// Provider id
        provider: String,
        /// The retryable failure
        error: ProviderError,
    },

    /// A provider used up its attempts (or failed fatally) and the cascade moved on
    #[error("Provider '{provider}' exhausted after {attempts} attempt(s): {last_error}")]
    ProviderExhausted {
        /// Provider id
        provider: String,
        /// Attempts spent on this provider
        attempts: u32,
        /// The failure that ended the provider's turn
        last_error: ProviderError,
    },

    /// Every provider failed for one hop of the path
    #[error("All providers exhausted for {hop}")]
    AllProvidersExhausted {
        /// The language pair that could not be translated, e.g. `en→fon`
        hop: String,
    },

    /// Placeholders were lost in translation
    #[error("Restoration mismatch: {0}")]
    RestorationMismatch(#[from] RestorationMismatch),

    /// No path cleared the viability threshold
    #[error("No viable path from {source_lang} to {target_lang} (best score {best_score:.3})")]
    PathUnroutable {
        /// Source language
        source_lang: String,
        /// Target language
        target_lang: String,
        /// Score of the best candidate that was rejected
        best_score: f64,
    },

    /// A cache tier failed
    #[error(transparent)]
    CacheUnavailable(#[from] CacheUnavailable),

    /// The per-segment deadline passed
    #[error("Segment deadline exceeded")]
    SegmentTimeout,

    /// The batch was cancelled
    #[error("Translation cancelled")]
    Cancelled,

    /// A worker task died
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranslationError {
    /// The one segment-level failure reported to users.
    ///
    /// Cancellation surfaces once per batch as `BatchCancelled`. Deadlines and worker
    /// failures still fail their segment, but are not reported as translation errors.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::AllProvidersExhausted { .. })
    }
}

/// A batch was cancelled; carries every slot, finished or not
#[derive(Error, Debug)]
#[error("Batch cancelled with {} of {} segment(s) translated", translated_count(.partial), .partial.len())]
pub struct BatchCancelled {
    /// Results in input order; unfinished segments hold a `Cancelled` failure
    pub partial: Vec<SegmentResult>,
}

impl BatchCancelled {
    /// Number of segments that finished successfully before cancellation
    pub fn translated_count(&self) -> usize {
        translated_count(&self.partial)
    }
}

fn translated_count(results: &[SegmentResult]) -> usize {
    results.iter().filter(|r| r.is_ok()).count()
}

/// Main application error type used by the binary
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error in the configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// The batch was interrupted
    #[error("{0}")]
    Cancelled(#[from] BatchCancelled),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(format!("{:#}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::File(format!("Invalid JSON: {}", error))
    }
}
