#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::index::DistanceMetric;

pub const DEFAULT_SYSTEM_TEMPLATE: &str = "You are a friendly and helpful customer service representative at {company}.
Your responses should be warm, natural, and conversational while being informative.
Use the following context to answer the question, but respond in a natural way as if you're
having a conversation. Avoid formal phrases like 'Based on the description provided'.

Context: {context}";

pub const DEFAULT_USER_TEMPLATE: &str = "Answer this question in a friendly, conversational way: {question}
Make sure to:
1. Start with a small warm greeting or acknowledgment
2. Use natural transitions and conversational language
3. Organize information in an easy-to-understand way
4. End with an offer to help further if needed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Knowledge document; relative paths resolve against the config directory
    pub path: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("faq_data.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub dimension: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackendKind {
    /// Exact brute-force scan held in memory
    Flat,
    /// LanceDB table under `<base_dir>/vectors`
    Lancedb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub backend: RetrievalBackendKind,
    pub metric: DistanceMetric,
    /// Candidates fetched for re-ranking in hybrid mode
    pub top_k: usize,
    /// Optional "no match" threshold applied by callers, never by the retriever
    pub max_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: RetrievalBackendKind::Flat,
            metric: DistanceMetric::Euclidean,
            top_k: 3,
            max_distance: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Ollama,
    /// Any OpenAI-compatible `/v1/chat/completions` endpoint
    Mistral,
}

impl GenerationProvider {
    #[inline]
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Mistral => "https://api.mistral.ai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    /// Overrides the provider's default endpoint
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub rerank_temperature: f32,
    pub rerank_max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Mistral,
            endpoint: None,
            model: "mistral-large-latest".to_string(),
            api_key_env: "MISTRAL_API_KEY".to_string(),
            temperature: 0.7,
            max_output_tokens: 500,
            rerank_temperature: 0.5,
            rerank_max_output_tokens: 150,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub company: String,
    /// Must contain `{context}`; may contain `{company}`
    pub system_template: String,
    /// Must contain `{question}`
    pub user_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            company: "NomadFoods".to_string(),
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

/// Web search used as generation context when the best FAQ match is farther
/// than `[retrieval].max_distance`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    /// DuckDuckGo Instant Answer API base URL
    pub endpoint: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.duckduckgo.com".to_string(),
            max_results: 3,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 16 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid top_k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid max_distance: {0} (must be a non-negative number)")]
    InvalidMaxDistance(f32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 1.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max output tokens: {0} (must be between 1 and 32768)")]
    InvalidMaxOutputTokens(u32),
    #[error("Invalid API key variable: {0} (cannot be empty)")]
    InvalidApiKeyEnv(String),
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
    #[error("Invalid web search max_results: {0} (must be between 1 and 10)")]
    InvalidMaxResults(usize),
    #[error("Web search fallback needs [retrieval].max_distance to decide when to search")]
    WebSearchWithoutThreshold,
    #[error("Invalid knowledge path (cannot be empty)")]
    InvalidKnowledgePath,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            knowledge: KnowledgeConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            prompt: PromptConfig::default(),
            web_search: WebSearchConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".faq-rag"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("faq-rag"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load_from(config_dir)
    }

    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.knowledge.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidKnowledgePath);
        }
        self.embedding.validate()?;
        self.retrieval.validate()?;
        self.generation.validate()?;
        self.prompt.validate()?;
        self.web_search.validate()?;
        if self.web_search.enabled && self.retrieval.max_distance.is_none() {
            return Err(ConfigError::WebSearchWithoutThreshold);
        }
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Knowledge document path, resolved against the base directory
    #[inline]
    pub fn knowledge_path(&self) -> PathBuf {
        if self.knowledge.path.is_absolute() {
            self.knowledge.path.clone()
        } else {
            self.get_base_dir().join(&self.knowledge.path)
        }
    }

    /// Get the path for the SQLite feedback database
    #[inline]
    pub fn feedback_database_path(&self) -> PathBuf {
        self.get_base_dir().join("feedback.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(16..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.provider == EmbeddingProvider::Hashing {
            return Ok(());
        }

        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(format!(
                "{}://{}:{}",
                self.protocol, self.host, self.port
            )));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            host: host.clone(),
            provider: EmbeddingProvider::Ollama,
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(16..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if let Some(max_distance) = self.max_distance {
            if !max_distance.is_finite() || max_distance < 0.0 {
                return Err(ConfigError::InvalidMaxDistance(max_distance));
            }
        }

        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=50).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.provider == GenerationProvider::Mistral && self.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }

        validate_temperature(self.temperature)?;
        validate_temperature(self.rerank_temperature)?;
        validate_max_output_tokens(self.max_output_tokens)?;
        validate_max_output_tokens(self.rerank_max_output_tokens)?;

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint());
        let url = Url::parse(endpoint).map_err(|_| ConfigError::InvalidUrl(endpoint.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        Ok(url)
    }

    /// Read the bearer token from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn set_provider(&mut self, provider: GenerationProvider) {
        self.provider = provider;
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        validate_temperature(temperature)?;
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_max_output_tokens(&mut self, max_output_tokens: u32) -> Result<(), ConfigError> {
        validate_max_output_tokens(max_output_tokens)?;
        self.max_output_tokens = max_output_tokens;
        Ok(())
    }
}

impl PromptConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.system_template.contains("{context}") {
            return Err(ConfigError::MissingPlaceholder("{context}"));
        }
        if !self.user_template.contains("{question}") {
            return Err(ConfigError::MissingPlaceholder("{question}"));
        }
        Ok(())
    }
}

impl WebSearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        if !(1..=10).contains(&self.max_results) {
            return Err(ConfigError::InvalidMaxResults(self.max_results));
        }
        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|_| ConfigError::InvalidUrl(self.endpoint.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        Ok(url)
    }
}

fn validate_temperature(temperature: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&temperature) {
        return Err(ConfigError::InvalidTemperature(temperature));
    }
    Ok(())
}

fn validate_max_output_tokens(max_output_tokens: u32) -> Result<(), ConfigError> {
    if !(1..=32768).contains(&max_output_tokens) {
        return Err(ConfigError::InvalidMaxOutputTokens(max_output_tokens));
    }
    Ok(())
}
