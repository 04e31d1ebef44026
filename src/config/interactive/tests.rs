use super::load_existing_config;
use crate::config::Config;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.base_dir, temp_dir.path());
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.llm.model.is_empty());
}

#[test]
fn load_existing_config_reads_saved_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut saved = Config::with_base_dir(temp_dir.path());
    saved.llm.model = "mistral:7b".to_string();
    saved.save().expect("should save config");

    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.llm.model, "mistral:7b");
}

#[test]
fn load_existing_config_ignores_broken_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "not = [valid")
        .expect("should write config");

    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config, Config::with_base_dir(temp_dir.path()));
}
