use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::providers::{
    TranslationProvider, check_status, classify_transport, http_client, normalize_endpoint, translation_system_prompt,
};

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Provider id
    id: String,
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Model name to use for generation
    model: String,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
}

impl GenerationRequest {
    /// Create a new non-streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: None,
            stream: Some(false),
        }
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }
}

/// Read a generate body, accepting a single object or JSONL stream chunks
fn parse_generation_body(body: &str) -> Option<String> {
    if let Ok(single) = serde_json::from_str::<GenerationResponse>(body) {
        return Some(single.response);
    }

    let mut full_response = String::new();
    let mut parsed_any = false;
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        if let Ok(chunk) = serde_json::from_str::<GenerationResponse>(line) {
            full_response.push_str(&chunk.response);
            parsed_any = true;
        }
    }
    parsed_any.then_some(full_response)
}

impl Ollama {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            id: id.into(),
            base_url: normalize_endpoint(&base_url.into(), DEFAULT_ENDPOINT),
            client: http_client(timeout_secs),
            model: model.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let model = if config.model.is_empty() { DEFAULT_MODEL } else { &config.model };
        Self::new(config.id.clone(), config.endpoint.clone(), model, config.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text from the Ollama API
    pub async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&self.id, e))?;
        let response = check_status(&self.id, response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Failed to get response text from Ollama API: {}", e)))?;

        parse_generation_body(&body).ok_or_else(|| {
            let preview: String = body.chars().take(500).collect();
            error!("Failed to parse Ollama API response. Raw response (first 500 chars): {}", preview);
            ProviderError::Unknown("Unparseable Ollama response".to_string())
        })
    }
}

#[async_trait]
impl TranslationProvider for Ollama {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let request = GenerationRequest::new(&self.model, text)
            .system(translation_system_prompt(source_lang, target_lang))
            .temperature(0.2);
        let output = self.generate(request).await?;
        debug!("{} generated {} chars", self.id, output.len());
        Ok(output.trim().to_string())
    }
}
