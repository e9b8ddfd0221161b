use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::providers::{
    TranslationProvider, check_status, classify_transport, http_client, normalize_endpoint, translation_system_prompt,
};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat completions client
#[derive(Debug)]
pub struct OpenAI {
    id: String,
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

/// Chat message for the completions API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completions request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
        }
    }

    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatMessage,
}

/// Chat completions response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
}

impl OpenAI {
    pub fn new(id: impl Into<String>, api_key: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            id: id.into(),
            client: http_client(timeout_secs),
            api_key: api_key.into(),
            endpoint: normalize_endpoint(&endpoint.into(), DEFAULT_ENDPOINT),
            model: model.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let model = if config.model.is_empty() { DEFAULT_MODEL } else { &config.model };
        Self::new(
            config.id.clone(),
            config.resolved_api_key(),
            config.endpoint.clone(),
            model,
            config.timeout_secs,
        )
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    /// Send a chat completions request
    pub async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::AuthError(format!("No API key configured for '{}'", self.id)));
        }

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&self.id, e))?;
        let response = check_status(&self.id, response).await?;

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Failed to parse OpenAI response: {}", e)))
    }
}

#[async_trait]
impl TranslationProvider for OpenAI {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest::new(&self.model)
            .add_message("system", translation_system_prompt(source_lang, target_lang))
            .add_message("user", text)
            .temperature(0.2);

        let response = self.complete(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| ProviderError::Unknown("OpenAI response contained no choices".to_string()))?;
        debug!("{} translated {} chars {}→{}", self.id, text.len(), source_lang, target_lang);
        Ok(content)
    }
}
