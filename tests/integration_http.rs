#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Full stack against mocked Ollama and inference endpoints

mod common;

use common::{keyword_vector, write_docs_csv};
use docs_helper::HelperError;
use docs_helper::config::{Config, GenerationConfig, OllamaConfig};
use docs_helper::embeddings::OllamaClient;
use docs_helper::generation::{Credential, HubClientFactory};
use docs_helper::loader::load_records;
use docs_helper::session::{ConversationSession, SessionContext};
use docs_helper::store::EmbeddingStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIMENSION: usize = 64;

/// Answers `/api/embed` with keyword vectors padded to the configured dimension
struct KeywordEmbedResponder;

impl Respond for KeywordEmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("embed request is json");
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .expect("input is an array")
            .iter()
            .map(|text| {
                let mut vector = keyword_vector(text.as_str().expect("input is text"));
                vector.resize(DIMENSION, 0.0);
                vector
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn config_for(ollama: &MockServer, hub: &MockServer, base_dir: &TempDir) -> Config {
    Config {
        ollama: OllamaConfig {
            host: "127.0.0.1".to_string(),
            port: ollama.address().port(),
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 2,
            embedding_dimension: DIMENSION as u32,
            ..OllamaConfig::default()
        },
        generation: GenerationConfig {
            endpoint: hub.uri(),
            model: "test/model".to_string(),
            timeout_seconds: 10,
            ..GenerationConfig::default()
        },
        base_dir: base_dir.path().to_path_buf(),
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn question_is_answered_through_both_endpoints() {
    let ollama = MockServer::start().await;
    let hub = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&ollama, &hub, &temp_dir);

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbedResponder)
        .mount(&ollama)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer hf_test"))
        .and(body_partial_json(json!({
            "model": "test/model",
            "max_tokens": 512
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Click New Page in the sidebar."}}]
        })))
        .expect(1)
        .mount(&hub)
        .await;

    let records = load_records(write_docs_csv(temp_dir.path())).expect("csv should load");
    let embedder = OllamaClient::new(&config).expect("client should build");
    let index = EmbeddingStore::new(&config)
        .open_or_build(&records, &embedder, false)
        .await
        .expect("index should build");
    assert_eq!(index.len(), 4);
    assert_eq!(index.dimension(), DIMENSION);
    assert!(config.vector_database_path().exists());

    let factory = HubClientFactory::new(config.generation.clone());
    let ctx = SessionContext {
        index: &index,
        embedder: &embedder,
        factory: &factory,
    };
    let mut session = ConversationSession::from_config(&config)
        .expect("session should build")
        .with_credential(Some(
            Credential::new("hf_test").expect("token should be accepted"),
        ));

    let answer = session
        .ask("How do I create a new page?", &ctx)
        .expect("answer should succeed");

    assert_eq!(answer.sources[0], "Creating Pages");
    assert!(
        answer
            .text
            .starts_with("Click New Page in the sidebar.\n\n*Related categories: Page Management")
    );
    assert_eq!(session.turns().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_token_leaves_history_empty() {
    let ollama = MockServer::start().await;
    let hub = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&ollama, &hub, &temp_dir);

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbedResponder)
        .mount(&ollama)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&hub)
        .await;

    let records = load_records(write_docs_csv(temp_dir.path())).expect("csv should load");
    let embedder = OllamaClient::new(&config).expect("client should build");
    let index = EmbeddingStore::new(&config)
        .open_or_build(&records, &embedder, false)
        .await
        .expect("index should build");

    let factory = HubClientFactory::new(config.generation.clone());
    let ctx = SessionContext {
        index: &index,
        embedder: &embedder,
        factory: &factory,
    };
    let mut session = ConversationSession::from_config(&config)
        .expect("session should build")
        .with_credential(Some(
            Credential::new("hf_wrong").expect("token should be accepted"),
        ));

    let result = session.ask("How do I create a new page?", &ctx);

    assert!(matches!(
        result,
        Err(HelperError::Generation(ref msg)) if msg.contains("Authentication failed")
    ));
    assert!(session.turns().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn embedding_outage_persists_nothing() {
    let ollama = MockServer::start().await;
    let hub = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&ollama, &hub, &temp_dir);

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ollama)
        .await;

    let records = load_records(write_docs_csv(temp_dir.path())).expect("csv should load");
    let embedder = OllamaClient::new(&config).expect("client should build");
    let result = EmbeddingStore::new(&config)
        .open_or_build(&records, &embedder, false)
        .await;

    assert!(matches!(result, Err(HelperError::Embedding(_))));
    assert!(!config.vector_database_path().exists());
}
