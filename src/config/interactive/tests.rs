use super::load_existing_config as load_existing_config_impl;
use tempfile::TempDir;

#[test]
fn load_existing_config_defaults_without_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert!(!config.embedding.host.is_empty());
    assert!(config.embedding.port > 0);
    assert!(config.retrieval.top_k > 0);
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_existing_config_reads_saved_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[prompt]\ncompany = \"Acme\"\n",
    )
    .expect("should write config");

    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.prompt.company, "Acme");
}
