#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{
    Config, ConfigError, EmbeddingConfig, EmbeddingProvider, GenerationConfig, GenerationProvider,
    RetrievalBackendKind, RetrievalConfig, WebSearchConfig,
};
use crate::index::DistanceMetric;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 FAQ Assistant Configuration Setup").bold().cyan());
    eprintln!();

    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    let mut config = load_existing_config(&config_dir)?;

    eprintln!("{}", style("Knowledge Base").bold().yellow());
    let knowledge_path: String = Input::new()
        .with_prompt("Path to the FAQ document")
        .default(config.knowledge.path.display().to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Path cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    config.knowledge.path = knowledge_path.trim().into();

    eprintln!();
    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    eprintln!("Configure how questions are turned into vectors.");
    eprintln!();
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Retrieval Configuration").bold().yellow());
    configure_retrieval(&mut config.retrieval)?;

    eprintln!();
    eprintln!("{}", style("Answer Generation").bold().yellow());
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Web Search Fallback").bold().yellow());
    eprintln!("Search the web when no FAQ entry is close enough to the question.");
    eprintln!();
    configure_web_search(&mut config.web_search, &mut config.retrieval)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if config.embedding.provider == EmbeddingProvider::Ollama {
        if test_ollama_connection(&config.embedding)? {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before indexing.");
        }
    }

    if config.generation.provider == GenerationProvider::Mistral
        && config.generation.api_key().is_none()
    {
        eprintln!(
            "{} {}",
            style("⚠ Warning: environment variable not set:").yellow(),
            style(&config.generation.api_key_env).cyan()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Knowledge Base:").bold().yellow());
    eprintln!("  Document: {}", style(config.knowledge_path().display()).cyan());

    eprintln!();
    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(format!("{:?}", config.embedding.provider)).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    if config.embedding.provider == EmbeddingProvider::Ollama {
        match config.embedding.ollama_url() {
            Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
        }
    }

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Backend: {}", style(format!("{:?}", config.retrieval.backend)).cyan());
    eprintln!("  Metric: {}", style(config.retrieval.metric).cyan());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    match config.retrieval.max_distance {
        Some(max_distance) => eprintln!("  Max Distance: {}", style(max_distance).cyan()),
        None => eprintln!("  Max Distance: {}", style("none").dim()),
    }

    eprintln!();
    eprintln!("{}", style("Generation Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(format!("{:?}", config.generation.provider)).cyan());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    match config.generation.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Temperature: {}", style(config.generation.temperature).cyan());
    eprintln!(
        "  Max Output Tokens: {}",
        style(config.generation.max_output_tokens).cyan()
    );
    eprintln!("  Company: {}", style(&config.prompt.company).cyan());

    eprintln!();
    eprintln!("{}", style("Web Search:").bold().yellow());
    if config.web_search.enabled {
        eprintln!("  Endpoint: {}", style(&config.web_search.endpoint).cyan());
        eprintln!("  Max Results: {}", style(config.web_search.max_results).cyan());
    } else {
        eprintln!("  {}", style("disabled").dim());
    }

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join("config.toml").exists() {
        let config = Config::load_from(config_dir)?;
        eprintln!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Config::load_from(config_dir)
    }
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let providers = &["ollama", "hashing (offline)"];
    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(usize::from(embedding.provider == EmbeddingProvider::Hashing))
        .items(providers)
        .interact()?;
    embedding.provider = if provider_index == 0 {
        EmbeddingProvider::Ollama
    } else {
        EmbeddingProvider::Hashing
    };

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (16..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 16 and 8192")
            }
        })
        .interact_text()?;
    embedding.set_dimension(dimension)?;

    if embedding.provider == EmbeddingProvider::Hashing {
        return Ok(());
    }

    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embedding.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(embedding.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(embedding.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.set_protocol(protocol)?;
    embedding.set_host(host)?;
    embedding.set_port(port)?;
    embedding.set_model(model)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let backends = &["flat (in memory)", "lancedb"];
    let backend_index = Select::new()
        .with_prompt("Vector index backend")
        .default(usize::from(retrieval.backend == RetrievalBackendKind::Lancedb))
        .items(backends)
        .interact()?;
    retrieval.backend = if backend_index == 0 {
        RetrievalBackendKind::Flat
    } else {
        RetrievalBackendKind::Lancedb
    };

    let metrics = &["euclidean", "cosine"];
    let metric_index = Select::new()
        .with_prompt("Distance metric")
        .default(usize::from(retrieval.metric == DistanceMetric::Cosine))
        .items(metrics)
        .interact()?;
    retrieval.metric = if metric_index == 0 {
        DistanceMetric::Euclidean
    } else {
        DistanceMetric::Cosine
    };

    let top_k: usize = Input::new()
        .with_prompt("Candidates to re-rank in hybrid mode")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 50")
            }
        })
        .interact_text()?;
    retrieval.set_top_k(top_k)?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    let providers = &["mistral (OpenAI-compatible API)", "ollama"];
    let provider_index = Select::new()
        .with_prompt("Chat completion provider")
        .default(usize::from(generation.provider == GenerationProvider::Ollama))
        .items(providers)
        .interact()?;
    generation.set_provider(if provider_index == 0 {
        GenerationProvider::Mistral
    } else {
        GenerationProvider::Ollama
    });

    let endpoint: String = Input::new()
        .with_prompt("Endpoint")
        .default(
            generation
                .endpoint
                .clone()
                .unwrap_or_else(|| generation.provider.default_endpoint().to_string()),
        )
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = GenerationConfig {
                endpoint: Some(input.clone()),
                ..GenerationConfig::default()
            };
            temp_config.endpoint_url()?;
            Ok(())
        })
        .interact_text()?;
    generation.endpoint = if endpoint == generation.provider.default_endpoint() {
        None
    } else {
        Some(endpoint)
    };

    let model: String = Input::new()
        .with_prompt("Chat model")
        .default(generation.model.clone())
        .interact_text()?;
    generation.set_model(model)?;

    let temperature: f32 = Input::new()
        .with_prompt("Sampling temperature")
        .default(generation.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 1.0")
            }
        })
        .interact_text()?;
    generation.set_temperature(temperature)?;

    Ok(())
}

fn configure_web_search(
    web_search: &mut WebSearchConfig,
    retrieval: &mut RetrievalConfig,
) -> Result<()> {
    web_search.enabled = Confirm::new()
        .with_prompt("Enable web search fallback?")
        .default(web_search.enabled)
        .interact()?;
    if !web_search.enabled {
        return Ok(());
    }

    let max_distance: f32 = Input::new()
        .with_prompt("Search the web when the best match distance exceeds")
        .default(retrieval.max_distance.unwrap_or(1.0))
        .validate_with(|input: &f32| -> Result<(), &str> {
            if input.is_finite() && *input >= 0.0 {
                Ok(())
            } else {
                Err("Must be a non-negative number")
            }
        })
        .interact_text()?;
    retrieval.max_distance = Some(max_distance);

    let max_results: usize = Input::new()
        .with_prompt("Web results to use as context")
        .default(web_search.max_results)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=10).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 10")
            }
        })
        .interact_text()?;
    web_search.max_results = max_results;

    Ok(())
}

fn test_ollama_connection(embedding: &EmbeddingConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        embedding.protocol, embedding.host, embedding.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
