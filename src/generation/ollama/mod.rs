
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::FaqError;
use crate::config::GenerationConfig;
use crate::generation::{
    ChatBackend, ChatMessage, GenerationParams, backend_error, join_endpoint,
};

/// Ollama `/api/chat` client, non-streaming
#[derive(Debug, Clone)]
pub struct OllamaChat {
    chat_url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaChat {
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = config
            .endpoint_url()
            .context("Failed to parse Ollama chat endpoint")?;
        let chat_url = join_endpoint(&base_url, "api/chat").context("Failed to build chat URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            chat_url,
            model: config.model.clone(),
            agent,
        })
    }
}

impl ChatBackend for OllamaChat {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    #[inline]
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> crate::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: params.temperature,
                num_predict: params.max_output_tokens,
            },
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            FaqError::GenerationBackend(format!("Failed to serialize chat request: {}", e))
        })?;

        debug!("Sending chat request to {}", self.chat_url);
        let response_text = self
            .agent
            .post(self.chat_url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(backend_error)?;

        let response: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            FaqError::GenerationBackend(format!("Malformed chat response: {}", e))
        })?;

        Ok(response.message.content)
    }
}
