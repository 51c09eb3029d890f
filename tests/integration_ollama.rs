#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

mod common;

use common::write_docs_csv;
use docs_helper::config::{Config, OllamaConfig};
use docs_helper::embeddings::{Embedder, OllamaClient};
use docs_helper::loader::load_records;
use docs_helper::store::EmbeddingStore;
use std::env;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

const TEST_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_config(base_dir: &TempDir) -> Config {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    Config {
        ollama: OllamaConfig {
            host,
            port,
            model,
            batch_size: 2,
            ..OllamaConfig::default()
        },
        base_dir: base_dir.path().to_path_buf(),
        ..Config::default()
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_embeds_with_configured_dimension() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_integration_test_config(&temp_dir);
    let client = OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60));

    client.health_check().expect("Ollama should be healthy");

    let vector = client
        .embed("How do I create a new page?")
        .expect("embedding should succeed");
    info!("Embedded question into {} dimensions", vector.len());
    assert_eq!(vector.len(), config.ollama.embedding_dimension as usize);
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_ranks_creating_pages_first() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_integration_test_config(&temp_dir);
    let client = OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60));

    let records = load_records(write_docs_csv(temp_dir.path())).expect("csv should load");
    let index = EmbeddingStore::new(&config)
        .open_or_build(&records, &client, false)
        .await
        .expect("index should build");

    let hits = index
        .query_text("How do I create a new page?", &client, 3)
        .expect("query should succeed");

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].record().title, "Creating Pages");
}
