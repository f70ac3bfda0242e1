use crate::backend::{Backend, BackendError, BackendId, BackendRegistry, CompletionRequest};
use crate::config::{LLMConfig, ProviderConfig};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const OPENAI_URL: &str = "https://api.openai.com";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// A completion backend reached over HTTPS.
pub struct HttpBackend {
    id: BackendId,
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(id: BackendId, provider: &ProviderConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = provider
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(id).to_string());

        Ok(Self {
            id,
            model: provider.model.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &CompletionRequest) -> RequestBuilder {
        match self.id {
            BackendId::Claude => self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&serde_json::json!({
                    "model": self.model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "system": request.system_prompt,
                    "messages": [
                        { "role": "user", "content": request.user_prompt }
                    ]
                })),
            BackendId::OpenAI => self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "model": self.model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "messages": [
                        { "role": "system", "content": request.system_prompt },
                        { "role": "user", "content": request.user_prompt }
                    ]
                })),
            BackendId::Gemini => self
                .client
                .post(format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .header("x-goog-api-key", &self.api_key)
                .json(&serde_json::json!({
                    "systemInstruction": { "parts": [ { "text": request.system_prompt } ] },
                    "contents": [
                        { "role": "user", "parts": [ { "text": request.user_prompt } ] }
                    ],
                    "generationConfig": {
                        "temperature": request.temperature,
                        "maxOutputTokens": request.max_tokens
                    }
                })),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        debug!(
            backend = %self.id,
            model = %self.model,
            temperature = request.temperature,
            prompt_chars = request.user_prompt.chars().count(),
            "sending completion request"
        );

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("invalid JSON body: {}", e.without_url())))?;

        extract_text(self.id, &json)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Transient(format!("unexpected response format from {}", self.id)))
    }
}

fn default_base_url(id: BackendId) -> &'static str {
    match id {
        BackendId::Claude => ANTHROPIC_URL,
        BackendId::OpenAI => OPENAI_URL,
        BackendId::Gemini => GEMINI_URL,
    }
}

fn classify_status(status: StatusCode, body: &str) -> BackendError {
    let message = format!("HTTP {}: {}", status.as_u16(), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            BackendError::Unavailable(message)
        }
        _ => BackendError::Transient(message),
    }
}

fn extract_text(id: BackendId, json: &Value) -> Option<&str> {
    match id {
        BackendId::Claude => json["content"][0]["text"].as_str(),
        BackendId::OpenAI => json["choices"][0]["message"]["content"].as_str(),
        BackendId::Gemini => json["candidates"][0]["content"]["parts"][0]["text"].as_str(),
    }
}

/// Registers an [`HttpBackend`] for every provider that has an API key.
pub fn registry_from_config(llm: &LLMConfig, timeout: Duration) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for id in BackendId::ALL {
        let provider = llm.provider(id);
        if let Some(key) = provider.api_key.clone().filter(|k| !k.trim().is_empty()) {
            let backend = HttpBackend::new(id, provider, key.trim().to_string(), timeout)?;
            registry = registry.with(id, Arc::new(backend));
        }
    }
    Ok(registry)
}
