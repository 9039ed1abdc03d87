use anyhow::{Context, Result};
use async_trait::async_trait;
use cardassist_core::GenerationError;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::GenerationConfig;
use crate::TextGenerator;

/// OpenAI-compatible `/chat/completions` client (Groq by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    config: GenerationConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            GenerationError::NotConfigured(
                "set GROQ_API_KEY or CARDASSIST_LLM_API_KEY".to_string(),
            )
        })?;

        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(api_key)
            .json(&self.payload(prompt))
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
        let text = extract_completion_text(&body)?;
        debug!(completion_chars = text.len(), "completion received");
        Ok(text)
    }
}

fn extract_completion_text(payload: &Value) -> Result<String, GenerationError> {
    let content = payload
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .ok_or_else(|| {
            GenerationError::MalformedResponse("missing choices[0].message.content".to_string())
        })?;

    let text = content.as_str().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text.to_string())
}
