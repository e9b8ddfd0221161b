/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for the cascade's back-ends:
 * - OpenAI: chat completions API
 * - LibreTranslate: self-hostable machine translation API
 * - Ollama: local LLM server
 * - Mock: deterministic echo for dry runs and tests
 */

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{error, warn};
use reqwest::Client;

use crate::app_config::{ProviderConfig, ProviderKind, TranslationConfig, parse_endpoint};
use crate::errors::ProviderError;
use crate::language_utils::language_display_name;

/// Common trait for all translation providers
///
/// Every provider translates one text for one language pair and classifies its
/// failures, so the cascade can use them interchangeably.
#[async_trait]
pub trait TranslationProvider: Send + Sync + Debug {
    /// Identifier used in config, logs and attempt records
    fn id(&self) -> &str;

    /// Translate `text` from `source_lang` to `target_lang`
    ///
    /// # Returns
    /// * `Result<String, ProviderError>` - The translated text or a classified failure
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError>;
}

/// Build one provider from its configuration
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn TranslationProvider>> {
    let provider: Arc<dyn TranslationProvider> = match config.kind {
        ProviderKind::OpenAI => Arc::new(openai::OpenAI::from_config(config)),
        ProviderKind::LibreTranslate => Arc::new(libretranslate::LibreTranslate::from_config(config)),
        ProviderKind::Ollama => Arc::new(ollama::Ollama::from_config(config)),
        ProviderKind::Mock => Arc::new(mock::MockProvider::working().with_id(&config.id)),
    };
    Ok(provider)
}

/// Build every provider named in the priority order, in that order
pub fn build_providers(config: &TranslationConfig) -> Result<Vec<Arc<dyn TranslationProvider>>> {
    config
        .provider_priority_order
        .iter()
        .map(|id| {
            let provider_config = config
                .providers
                .iter()
                .find(|p| &p.id == id)
                .ok_or_else(|| anyhow!("Provider '{}' is listed in the priority order but not configured", id))?;
            build_provider(provider_config)
        })
        .collect()
}

/// HTTP client with the provider's request timeout
pub(crate) fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_default()
}

/// Base URL for a configured endpoint, without a trailing slash.
///
/// Empty means `default`; a missing scheme means plain http. An endpoint that still
/// does not parse is kept as written, and its requests fail as `InvalidRequest`.
pub(crate) fn normalize_endpoint(endpoint: &str, default: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return default.to_string();
    }
    match parse_endpoint(endpoint) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(e) => {
            warn!("Unusable provider endpoint '{}': {}", endpoint, e);
            endpoint.trim_end_matches('/').to_string()
        }
    }
}

/// Classify a transport-level reqwest failure
pub(crate) fn classify_transport(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::Timeout(format!("{}: {}", provider, err));
    }
    if err.is_builder() {
        return ProviderError::InvalidRequest(format!("{}: {}", provider, err));
    }
    match err.status() {
        Some(status) => ProviderError::from_status(status.as_u16(), err.to_string()),
        None => ProviderError::Unknown(format!("{}: {}", provider, err)),
    }
}

/// Turn a non-success response into a classified error
pub(crate) async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());
    error!("{} API error ({}): {}", provider, status, error_text);
    Err(ProviderError::from_status(status.as_u16(), error_text))
}

/// System prompt shared by the LLM-backed providers
pub(crate) fn translation_system_prompt(source_lang: &str, target_lang: &str) -> String {
    format!(
        "You are a professional translator. Translate the user's text from {} to {}. \
         Tokens of the form __TERM_xxxxxx_N_xx__ are protected terms: copy each one \
         exactly as written, in the position that fits the translated sentence. \
         Reply with the translation only, without notes or quotes.",
        language_display_name(source_lang),
        language_display_name(target_lang)
    )
}

pub mod libretranslate;
pub mod mock;
pub mod ollama;
pub mod openai;
