
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

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints such as Mistral.
/// An endpoint that already ends in `/v1` (OpenRouter's `/api/v1`) is used as is.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleChat {
    completions_url: Url,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
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

impl OpenAiCompatibleChat {
    /// The API key is read from `api_key_env` now; a missing key only fails on `complete`
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = config
            .endpoint_url()
            .context("Failed to parse chat completions endpoint")?;
        let relative = if base_url.path().trim_end_matches('/').ends_with("/v1") {
            "chat/completions"
        } else {
            "v1/chat/completions"
        };
        let completions_url = join_endpoint(&base_url, relative)
            .context("Failed to build chat completions URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            completions_url,
            model: config.model.clone(),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            agent,
        })
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl ChatBackend for OpenAiCompatibleChat {
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
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(FaqError::GenerationBackend(format!(
                "no API key found in environment variable {}",
                self.api_key_env
            )));
        };

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_output_tokens,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            FaqError::GenerationBackend(format!("Failed to serialize completion request: {}", e))
        })?;

        debug!("Sending completion request to {}", self.completions_url);
        let response_text = self
            .agent
            .post(self.completions_url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(backend_error)?;

        let response: CompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            FaqError::GenerationBackend(format!("Malformed completion response: {}", e))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                FaqError::GenerationBackend("completion response had no choices".to_string())
            })
    }
}
