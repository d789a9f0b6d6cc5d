// Configuration management module
// TOML settings under ~/.faq-rag and the interactive setup wizard

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, EmbeddingProvider, GenerationConfig,
    GenerationProvider, KnowledgeConfig, PromptConfig, RetrievalBackendKind, RetrievalConfig,
    WebSearchConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
