//! OpenAI-compatible chat-completions client (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use enhancer_shared::{LanguageModel, LlmConfig, ProviderError, Result, read_secret};

use crate::http::{build_client, check_status, decode_json, endpoint, map_send_error};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions backed [`LanguageModel`].
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: endpoint(base_url, "chat/completions")?,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from the `[llm]` section, reading the API key from its env var.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        Self::new(&config.base_url, api_key, config.model.clone(), timeout)
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
    ) -> std::result::Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: ctx,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(response).await?;
        let body: ChatResponse = decode_json(response).await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "completion contained no text".into(),
            ));
        }

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}
