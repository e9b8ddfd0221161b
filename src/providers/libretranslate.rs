use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::providers::{TranslationProvider, check_status, classify_transport, http_client, normalize_endpoint};

const DEFAULT_ENDPOINT: &str = "http://localhost:5000";

/// LibreTranslate client
#[derive(Debug)]
pub struct LibreTranslate {
    id: String,
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

/// Body of `POST /translate`
#[derive(Debug, Serialize)]
pub struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}

impl LibreTranslate {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            id: id.into(),
            client: http_client(timeout_secs),
            endpoint: normalize_endpoint(&endpoint.into(), DEFAULT_ENDPOINT),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.id.clone(),
            config.endpoint.clone(),
            Some(config.resolved_api_key()),
            config.timeout_secs,
        )
    }

    fn api_url(&self) -> String {
        format!("{}/translate", self.endpoint)
    }
}

#[async_trait]
impl TranslationProvider for LibreTranslate {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let request = TranslateRequest {
            q: text,
            source: source_lang,
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.api_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&self.id, e))?;
        let response = check_status(&self.id, response).await?;

        let body = response
            .json::<TranslateResponse>()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Failed to parse LibreTranslate response: {}", e)))?;
        Ok(body.translated_text)
    }
}
