use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.protocol, "http");
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.embedding.port, 11434);
    assert_eq!(config.embedding.model, "nomic-embed-text:latest");
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.retrieval.metric, DistanceMetric::Euclidean);
    assert_eq!(config.generation.model, "mistral-large-latest");
    assert_eq!(config.generation.max_output_tokens, 500);
    assert_eq!(config.generation.rerank_max_output_tokens, 150);
    assert_eq!(config.prompt.company, "NomadFoods");
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.embedding.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.max_distance = Some(-1.0);
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generation.temperature = 1.5;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTemperature(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.generation.max_output_tokens = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.knowledge.path = PathBuf::new();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidKnowledgePath)
    ));
}

#[test]
fn hashing_provider_skips_endpoint_checks() {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingProvider::Hashing;
    config.embedding.protocol = "ftp".to_string();
    assert!(config.validate().is_ok());

    config.embedding.dimension = 8;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidEmbeddingDimension(8))
    ));
}

#[test]
fn prompt_templates_require_placeholders() {
    let mut config = Config::default();
    config.prompt.system_template = "No context here".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingPlaceholder("{context}"))
    ));

    let mut config = Config::default();
    config.prompt.user_template = "Just answer".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingPlaceholder("{question}"))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .embedding
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn generation_endpoint_defaults_per_provider() {
    let mut generation = GenerationConfig::default();
    assert_eq!(
        generation
            .endpoint_url()
            .expect("default endpoint is valid")
            .as_str(),
        "https://api.mistral.ai/"
    );

    generation.set_provider(GenerationProvider::Ollama);
    assert_eq!(
        generation
            .endpoint_url()
            .expect("default endpoint is valid")
            .host_str(),
        Some("localhost")
    );

    generation.endpoint = Some("not a url".to_string());
    assert!(matches!(
        generation.endpoint_url(),
        Err(ConfigError::InvalidUrl(_))
    ));
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let mut parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    parsed_config.base_dir = config.base_dir.clone();
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_section_defaults() {
    let partial = r#"
        [retrieval]
        top_k = 5
        metric = "cosine"

        [generation]
        provider = "ollama"
        model = "llama3"
    "#;

    let config: Config = toml::from_str(partial).expect("partial config parses");
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.retrieval.metric, DistanceMetric::Cosine);
    assert_eq!(config.retrieval.backend, RetrievalBackendKind::Flat);
    assert_eq!(config.generation.provider, GenerationProvider::Ollama);
    assert_eq!(config.generation.temperature, 0.7);
    assert_eq!(config.embedding, EmbeddingConfig::default());
}

#[test]
fn setter_validation() {
    let mut embedding = EmbeddingConfig::default();

    assert!(embedding.set_protocol("https".to_string()).is_ok());
    assert!(embedding.set_host("example.com".to_string()).is_ok());
    assert!(embedding.set_port(8080).is_ok());
    assert!(embedding.set_model("new-model".to_string()).is_ok());
    assert!(embedding.set_batch_size(128).is_ok());
    assert!(embedding.set_dimension(384).is_ok());

    assert!(embedding.set_protocol("ftp".to_string()).is_err());
    assert!(embedding.set_port(0).is_err());
    assert!(embedding.set_model(String::new()).is_err());
    assert!(embedding.set_batch_size(0).is_err());
    assert!(embedding.set_dimension(4).is_err());

    let mut retrieval = RetrievalConfig::default();
    assert!(retrieval.set_top_k(10).is_ok());
    assert!(retrieval.set_top_k(51).is_err());
    assert_eq!(retrieval.top_k, 10);

    let mut generation = GenerationConfig::default();
    assert!(generation.set_temperature(0.2).is_ok());
    assert!(generation.set_temperature(-0.1).is_err());
    assert!(generation.set_max_output_tokens(1000).is_ok());
    assert!(generation.set_model("  ".to_string()).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load_from(temp_dir.path()).expect("missing config falls back to defaults");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.embedding, EmbeddingConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let base_dir = temp_dir.path().join(".faq-rag");

    let mut config = Config {
        base_dir: base_dir.clone(),
        ..Config::default()
    };
    config.retrieval.backend = RetrievalBackendKind::Lancedb;
    config.generation.set_provider(GenerationProvider::Ollama);
    config.prompt.company = "Acme".to_string();

    config.save().expect("should save config");
    assert!(base_dir.join("config.toml").exists());

    let loaded = Config::load_from(&base_dir).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 0\n",
    )
    .expect("should write config");

    assert!(Config::load_from(temp_dir.path()).is_err());
}

#[test]
fn paths_resolve_against_base_dir() {
    let config = Config {
        base_dir: PathBuf::from("/tmp/faq"),
        ..Config::default()
    };

    assert_eq!(config.knowledge_path(), PathBuf::from("/tmp/faq/faq_data.json"));
    assert_eq!(
        config.feedback_database_path(),
        PathBuf::from("/tmp/faq/feedback.db")
    );
    assert_eq!(config.vector_database_path(), PathBuf::from("/tmp/faq/vectors"));

    let absolute = Config {
        knowledge: KnowledgeConfig {
            path: PathBuf::from("/data/faq.json"),
        },
        ..config
    };
    assert_eq!(absolute.knowledge_path(), PathBuf::from("/data/faq.json"));
}

const API_KEY_TEST_VAR: &str = "FAQ_RAG_SETTINGS_TEST_API_KEY";

#[test]
#[serial_test::serial]
fn api_key_reads_configured_env_var() {
    let generation = GenerationConfig {
        api_key_env: API_KEY_TEST_VAR.to_string(),
        ..GenerationConfig::default()
    };

    // SAFETY: serialised with every other test that mutates this variable
    unsafe { std::env::set_var(API_KEY_TEST_VAR, "secret-key") };
    assert_eq!(generation.api_key(), Some("secret-key".to_string()));

    // SAFETY: as above
    unsafe { std::env::set_var(API_KEY_TEST_VAR, "   ") };
    assert_eq!(generation.api_key(), None);

    // SAFETY: as above
    unsafe { std::env::remove_var(API_KEY_TEST_VAR) };
    assert_eq!(generation.api_key(), None);
}

#[test]
fn web_search_defaults_and_validation() {
    let config = Config::default();
    assert!(!config.web_search.enabled);
    assert_eq!(config.web_search.endpoint, "https://api.duckduckgo.com");
    assert!(config.web_search.validate().is_ok());

    let mut web_search = WebSearchConfig {
        max_results: 0,
        ..WebSearchConfig::default()
    };
    assert!(matches!(
        web_search.validate(),
        Err(ConfigError::InvalidMaxResults(0))
    ));

    web_search.max_results = 3;
    web_search.endpoint = "ftp://search.example.com".to_string();
    assert!(matches!(
        web_search.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));
}

#[test]
fn enabled_web_search_requires_distance_threshold() {
    let mut config = Config::default();
    config.web_search.enabled = true;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::WebSearchWithoutThreshold)
    ));

    config.retrieval.max_distance = Some(0.8);
    assert!(config.validate().is_ok());

    let parsed: Config = toml::from_str(
        "[retrieval]\nmax_distance = 0.8\n\n[web_search]\nenabled = true\nmax_results = 5\n",
    )
    .expect("should parse web search section");
    assert!(parsed.web_search.enabled);
    assert_eq!(parsed.web_search.max_results, 5);
    assert_eq!(parsed.web_search.timeout_secs, 15);
}
