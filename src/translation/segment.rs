/*!
 * Data model shared by the orchestration core: segments, attempt records and
 * per-segment results.
 */

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::errors::{ProviderError, ProviderErrorKind, TranslationError};
use crate::language_utils::canonical_language_code;

/// Domain used when a segment carries no hint
pub const DEFAULT_DOMAIN: &str = "general";

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

/// A bounded unit of source text translated as one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// Upstream identifier, echoed back in the result
    pub id: String,
    /// Text to translate
    pub source_text: String,
    /// Language of `source_text`
    pub source_lang: String,
    /// Language to translate into
    pub target_lang: String,
    /// Subject domain, e.g. "technical" or "medical"
    #[serde(default = "default_domain")]
    pub domain_hint: String,
}

impl Segment {
    /// Create a new segment
    pub fn new(
        id: impl Into<String>,
        source_text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        domain_hint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            domain_hint: domain_hint.into(),
        }
    }

    /// Copy of this segment with canonical language codes and a normalized domain
    pub fn canonical(&self) -> Self {
        let domain = self.domain_hint.trim().to_lowercase();
        Self {
            id: self.id.clone(),
            source_text: self.source_text.clone(),
            source_lang: canonical_language_code(&self.source_lang),
            target_lang: canonical_language_code(&self.target_lang),
            domain_hint: if domain.is_empty() { default_domain() } else { domain },
        }
    }
}

/// One directed translation step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.source, self.target)
    }
}

/// Lifecycle of a single provider attempt.
///
/// `Pending → InFlight → {Succeeded, RetryableFailure, FatalFailure}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Pending,
    InFlight,
    Succeeded,
    RetryableFailure,
    FatalFailure,
}

impl AttemptState {
    /// Terminal state for a finished provider call
    pub fn classify<T>(outcome: &Result<T, ProviderError>) -> Self {
        match outcome {
            Ok(_) => Self::Succeeded,
            Err(err) if err.is_retryable() => Self::RetryableFailure,
            Err(_) => Self::FatalFailure,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InFlight)
    }
}

/// Immutable record of one cascade step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationAttempt {
    provider: String,
    pivot_path: String,
    hop: LanguagePair,
    attempt: u32,
    status: AttemptState,
    latency: Duration,
    error_kind: Option<ProviderErrorKind>,
}

impl TranslationAttempt {
    pub(crate) fn new(
        provider: impl Into<String>,
        pivot_path: impl Into<String>,
        hop: LanguagePair,
        attempt: u32,
        status: AttemptState,
        latency: Duration,
        error_kind: Option<ProviderErrorKind>,
    ) -> Self {
        Self {
            provider: provider.into(),
            pivot_path: pivot_path.into(),
            hop,
            attempt,
            status,
            latency,
            error_kind,
        }
    }

    /// Provider id that served the attempt
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Full path the attempt belonged to, e.g. `en→fr→fon`
    pub fn pivot_path(&self) -> &str {
        &self.pivot_path
    }

    /// The hop of the path this attempt translated
    pub fn hop(&self) -> &LanguagePair {
        &self.hop
    }

    /// 1-based attempt number on this provider for this hop
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn status(&self) -> AttemptState {
        self.status
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn error_kind(&self) -> Option<ProviderErrorKind> {
        self.error_kind
    }
}

/// Successful output of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedSegment {
    pub id: String,
    pub text: String,
    pub attempts: Vec<TranslationAttempt>,
    pub cache_hit: bool,
    /// Placeholders were lost and the text was passed through stripped
    pub degraded: bool,
}

/// A segment that could not be translated
#[derive(Error, Debug, Clone, Serialize)]
#[error("Segment '{id}' failed: {error}")]
pub struct SegmentFailure {
    pub id: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: TranslationError,
    /// Attempts made before the failure, in order
    pub attempts: Vec<TranslationAttempt>,
}

impl SegmentFailure {
    pub fn new(id: impl Into<String>, error: TranslationError, attempts: Vec<TranslationAttempt>) -> Self {
        Self {
            id: id.into(),
            error,
            attempts,
        }
    }
}

/// Outcome of translating one segment
pub type SegmentResult = Result<TranslatedSegment, SegmentFailure>;

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Truncate text for logging purposes
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
