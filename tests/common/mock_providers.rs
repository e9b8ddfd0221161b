/*!
 * Scripted providers for the integration suite
 *
 * Unlike `MockProvider`, these follow a per-call script and record every call,
 * so tests can assert exactly which provider saw which hop.
 */

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use wikitranslate::errors::{ProviderError, ProviderErrorKind};
use wikitranslate::providers::TranslationProvider;

/// What one call does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Answer `[target] text`
    Answer,
    /// Fail with the given kind
    Fail(ProviderErrorKind),
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Provider that plays back a script, then keeps answering
#[derive(Debug)]
pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, script: &[Step]) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Provider that answers every call
    pub fn answering(id: &str) -> Arc<Self> {
        Self::new(id, &[])
    }

    /// Provider that fails `times` calls with `kind` before answering
    pub fn failing_first(id: &str, times: usize, kind: ProviderErrorKind) -> Arc<Self> {
        Self::new(id, &vec![Step::Fail(kind); times])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TranslationProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        self.calls.lock().push(Call {
            text: text.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        });
        let step = self.script.lock().pop_front().unwrap_or(Step::Answer);

        match step {
            Step::Answer => Ok(format!("[{}] {}", target_lang, text)),
            Step::Fail(kind) => Err(ProviderError::new(kind, format!("scripted failure from {}", self.id))),
        }
    }
}

/// Provider whose latency falls as the trailing number in the text rises,
/// so later segments of a batch finish first
#[derive(Debug, Default)]
pub struct ReverseLatencyProvider;

#[async_trait]
impl TranslationProvider for ReverseLatencyProvider {
    fn id(&self) -> &str {
        "reverse-latency"
    }

    async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let n: u64 = text
            .rsplit(' ')
            .next()
            .and_then(|last| last.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(n * 10))).await;
        Ok(format!("[{}] {}", target_lang, text))
    }
}

/// Provider that fails only for texts containing `poison`
#[derive(Debug)]
pub struct PoisonedProvider {
    pub poison: &'static str,
}

#[async_trait]
impl TranslationProvider for PoisonedProvider {
    fn id(&self) -> &str {
        "poisoned"
    }

    async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        if text.contains(self.poison) {
            return Err(ProviderError::InvalidRequest(format!("refusing '{}'", text)));
        }
        Ok(format!("[{}] {}", target_lang, text))
    }
}
