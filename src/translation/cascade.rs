/*!
 * Provider cascade.
 *
 * Each hop of a pivot path is translated by trying providers in priority
 * order. A provider is retried in place on retryable failures, with capped
 * exponential backoff plus jitter, and skipped right away on fatal ones.
 * The transition logic lives in `next_step` so it can be tested without
 * any network code.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use rand::Rng;
use tokio::time::Instant;

use crate::app_config::TranslationConfig;
use crate::errors::{ProviderError, TranslationError};
use crate::providers::TranslationProvider;
use crate::translation::cancel::CancellationSignal;
use crate::translation::pivot::PivotPath;
use crate::translation::segment::{AttemptState, LanguagePair, TranslationAttempt};

/// Retry settings for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per provider per hop, at least 1
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Add uniform jitter in `[0, delay/2]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_millis(8000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            backoff_max: backoff_max.max(backoff_base),
            jitter: true,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(
            config.max_retries_per_provider,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// `min(max, base × 2^(attempt-1))` for a 1-based attempt number
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Backoff before the attempt after `attempt`, jitter included
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half_ms = (delay.as_millis() / 2) as u64;
        let jitter = Duration::from_millis(rand::rng().random_range(0..=half_ms));
        (delay + jitter).min(self.backoff_max)
    }
}

/// What the cascade does after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    /// Try the same provider again after `delay`
    RetrySameProvider { delay: Duration },
    /// Move on to the next provider
    AdvanceProvider,
    /// The hop is translated
    Finish,
}

/// Transition for an attempt that ended in `state`; `attempt` is 1-based
pub fn next_step(state: AttemptState, attempt: u32, policy: &RetryPolicy) -> CascadeStep {
    match state {
        AttemptState::Succeeded => CascadeStep::Finish,
        AttemptState::Pending | AttemptState::InFlight => CascadeStep::RetrySameProvider { delay: Duration::ZERO },
        AttemptState::RetryableFailure if attempt < policy.max_attempts => CascadeStep::RetrySameProvider {
            delay: policy.delay(attempt),
        },
        AttemptState::RetryableFailure | AttemptState::FatalFailure => CascadeStep::AdvanceProvider,
    }
}

/// Successful cascade run
#[derive(Debug, Clone)]
pub struct CascadeOutput {
    pub text: String,
    pub attempts: Vec<TranslationAttempt>,
}

/// Failed cascade run with the attempts made so far
#[derive(Debug, Clone)]
pub struct CascadeFailure {
    pub error: TranslationError,
    pub attempts: Vec<TranslationAttempt>,
}

/// Ordered providers with retry and timeout settings
#[derive(Debug, Clone)]
pub struct ProviderCascade {
    providers: Vec<Arc<dyn TranslationProvider>>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl ProviderCascade {
    pub fn new(providers: Vec<Arc<dyn TranslationProvider>>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            providers,
            policy,
            attempt_timeout,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn TranslationProvider>] {
        &self.providers
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Translate `text` along every hop of `path`
    pub async fn execute(
        &self,
        text: &str,
        path: &PivotPath,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
    ) -> Result<CascadeOutput, CascadeFailure> {
        let label = path.label();
        let mut attempts = Vec::new();
        let mut current = text.to_string();

        for hop in path.hops() {
            match self.run_hop(&current, hop, &label, cancel, deadline, &mut attempts).await {
                Ok(translated) => current = translated,
                Err(error) => return Err(CascadeFailure { error, attempts }),
            }
        }

        Ok(CascadeOutput { text: current, attempts })
    }

    async fn run_hop(
        &self,
        text: &str,
        hop: &LanguagePair,
        label: &str,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
        attempts: &mut Vec<TranslationAttempt>,
    ) -> Result<String, TranslationError> {
        for provider in &self.providers {
            let mut attempt = 1;
            loop {
                if cancel.is_cancelled() {
                    return Err(TranslationError::Cancelled);
                }
                let limit = match deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(TranslationError::SegmentTimeout);
                        }
                        self.attempt_timeout.min(deadline - now)
                    }
                    None => self.attempt_timeout,
                };

                debug!("{} attempt {} on {} ({})", provider.id(), attempt, hop, label);
                let started = Instant::now();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = tokio::time::timeout(limit, provider.translate(text, &hop.source, &hop.target)) => Some(result),
                };
                let latency = started.elapsed();

                let result = match outcome {
                    None => return Err(TranslationError::Cancelled),
                    Some(Ok(result)) => result,
                    Some(Err(_)) => Err(ProviderError::Timeout(format!("No answer within {:?}", limit))),
                };
                let state = AttemptState::classify(&result);
                attempts.push(TranslationAttempt::new(
                    provider.id(),
                    label,
                    hop.clone(),
                    attempt,
                    state,
                    latency,
                    result.as_ref().err().map(ProviderError::kind),
                ));

                let error = match result {
                    Ok(translated) => return Ok(translated),
                    Err(error) => error,
                };

                match next_step(state, attempt, &self.policy) {
                    CascadeStep::RetrySameProvider { delay } => {
                        let transient = TranslationError::Transient {
                            provider: provider.id().to_string(),
                            error,
                        };
                        warn!(
                            "{} (attempt {}/{}), retrying in {:?}",
                            transient, attempt, self.policy.max_attempts, delay
                        );
                        if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                            return Err(TranslationError::SegmentTimeout);
                        }
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(TranslationError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                    CascadeStep::AdvanceProvider | CascadeStep::Finish => {
                        let exhausted = TranslationError::ProviderExhausted {
                            provider: provider.id().to_string(),
                            attempts: attempt,
                            last_error: error,
                        };
                        warn!("{}", exhausted);
                        break;
                    }
                }
            }
        }

        let exhausted = TranslationError::AllProvidersExhausted { hop: hop.to_string() };
        error!("{} (path {})", exhausted, label);
        Err(exhausted)
    }
}
