// Answer generation module
// Chat completion backends and the persona prompt around them

pub mod ollama;
pub mod openai;


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use tracing::debug;

use crate::config::{Config, GenerationConfig, GenerationProvider, PromptConfig};
use crate::{FaqError, Result};

pub use ollama::OllamaChat;
pub use openai::OpenAiCompatibleChat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(FaqError::InvalidParameters(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(FaqError::InvalidParameters(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters for answer generation
    #[inline]
    pub fn answer(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// Parameters for re-ranking
    #[inline]
    pub fn rerank(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.rerank_temperature,
            max_output_tokens: config.rerank_max_output_tokens,
        }
    }
}

impl Default for GenerationParams {
    #[inline]
    fn default() -> Self {
        Self::answer(&GenerationConfig::default())
    }
}

/// A chat completion service. Any failure, including an empty completion,
/// is reported as `GenerationBackend`.
pub trait ChatBackend: Send + Sync {
    fn model_id(&self) -> &str;

    fn complete(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String>;
}

/// Build the chat backend selected by `[generation].provider`
#[inline]
pub fn chat_backend_from_config(config: &GenerationConfig) -> Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match config.provider {
        GenerationProvider::Ollama => Arc::new(
            OllamaChat::new(config).map_err(|e| FaqError::Config(format!("{:#}", e)))?,
        ),
        GenerationProvider::Mistral => Arc::new(
            OpenAiCompatibleChat::new(config).map_err(|e| FaqError::Config(format!("{:#}", e)))?,
        ),
    };
    Ok(backend)
}

/// Rewrites a retrieved answer into a conversational reply
#[derive(Clone)]
pub struct AnswerGenerator {
    backend: Arc<dyn ChatBackend>,
    prompt: PromptConfig,
}

impl AnswerGenerator {
    #[inline]
    pub fn new(backend: Arc<dyn ChatBackend>, prompt: PromptConfig) -> Self {
        Self { backend, prompt }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            chat_backend_from_config(&config.generation)?,
            config.prompt.clone(),
        ))
    }

    #[inline]
    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// System and user messages for one question
    #[inline]
    pub fn build_messages(&self, user_question: &str, context_answer: &str) -> Vec<ChatMessage> {
        let system = self
            .prompt
            .system_template
            .replace("{company}", &self.prompt.company)
            .replace("{context}", context_answer);
        let user = self.prompt.user_template.replace("{question}", user_question);
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    #[inline]
    pub fn generate(
        &self,
        user_question: &str,
        context_answer: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        params.validate()?;

        let messages = self.build_messages(user_question, context_answer);
        debug!(
            "Generating answer with {} (temperature {}, max tokens {})",
            self.backend.model_id(),
            params.temperature,
            params.max_output_tokens
        );

        let text = self.backend.complete(&messages, params)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(FaqError::GenerationBackend(
                "completion contained no text".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

/// Join `relative` under the endpoint's path, keeping any prefix such as `/api/v1`
pub(crate) fn join_endpoint(
    base: &Url,
    relative: &str,
) -> std::result::Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(relative.trim_start_matches('/'))
}

/// Map an HTTP client failure onto the generation error
pub(crate) fn backend_error(error: ureq::Error) -> FaqError {
    match error {
        ureq::Error::StatusCode(401 | 403) => {
            FaqError::GenerationBackend("authentication rejected by chat backend".to_string())
        }
        ureq::Error::StatusCode(429) => {
            FaqError::GenerationBackend("chat backend rate limit exceeded".to_string())
        }
        ureq::Error::StatusCode(status) => {
            FaqError::GenerationBackend(format!("chat backend returned HTTP {}", status))
        }
        other => FaqError::GenerationBackend(format!("chat request failed: {}", other)),
    }
}
