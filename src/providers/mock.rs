/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with an echoed translation
 * - `MockProvider::fail_first()` - Fails a few times, then succeeds
 * - `MockProvider::failing()` - Always fails with the given error kind
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::providers::TranslationProvider;
use crate::translation::protection::strip_placeholders;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails `times` requests with `kind`, then succeeds
    FailFirst { times: usize, kind: ProviderErrorKind },
    /// Always fails with `kind`
    Failing { kind: ProviderErrorKind },
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
    /// Succeeds but loses every placeholder token
    DropPlaceholders,
}

/// Signature of a custom response generator: `(text, source, target)`
pub type ResponseFn = fn(&str, &str, &str) -> String;

/// Mock provider for testing translation behavior
#[derive(Debug)]
pub struct MockProvider {
    /// Provider id
    id: String,
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Custom response generator (optional)
    custom_response: Option<ResponseFn>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            id: "mock".to_string(),
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            custom_response: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a provider that fails `times` requests before succeeding
    pub fn fail_first(times: usize, kind: ProviderErrorKind) -> Self {
        Self::new(MockBehavior::FailFirst { times, kind })
    }

    /// Create a failing mock provider that always errors
    pub fn failing(kind: ProviderErrorKind) -> Self {
        Self::new(MockBehavior::Failing { kind })
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    /// Create a mock that answers after `delay_ms`
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set the provider id
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: ResponseFn) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Number of requests served so far, across clones
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn respond(&self, text: &str, source_lang: &str, target_lang: &str) -> String {
        match self.custom_response {
            Some(generator) => generator(text, source_lang, target_lang),
            None => format!("[{}] {}", target_lang, text),
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            MockBehavior::Working => Ok(self.respond(text, source_lang, target_lang)),

            MockBehavior::FailFirst { times, kind } => {
                if count < times {
                    Err(ProviderError::new(
                        kind,
                        format!("Simulated failure (request #{})", count + 1),
                    ))
                } else {
                    Ok(self.respond(text, source_lang, target_lang))
                }
            }

            MockBehavior::Failing { kind } => Err(ProviderError::new(kind, "Simulated provider failure")),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::Unknown(format!(
                        "Simulated intermittent failure (request #{})",
                        count + 1
                    )))
                } else {
                    Ok(self.respond(text, source_lang, target_lang))
                }
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(self.respond(text, source_lang, target_lang))
            }

            MockBehavior::DropPlaceholders => {
                let stripped = strip_placeholders(text);
                Ok(self.respond(&stripped, source_lang, target_lang))
            }
        }
    }
}
