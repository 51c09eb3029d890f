#![allow(
    dead_code,
    reason = "each integration test binary uses a different subset of helpers"
)]

use docs_helper::Result;
use docs_helper::embeddings::Embedder;
use docs_helper::generation::{Credential, GenerationParams, Generator, GeneratorFactory};
use docs_helper::session::Turn;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Word stems per dimension; a text's vector counts stem occurrences
pub const VOCABULARY: [&[&str]; 8] = [
    &["page"],
    &["creat", "new"],
    &["text", "format", "bold"],
    &["image", "media", "video"],
    &["table", "database", "row"],
    &["share", "invite", "collaborat"],
    &["integrat", "slack", "connect"],
    &["offline", "sync"],
];

pub const DOCS_CSV: &str = "\
Title,Content,Category,Keywords
Creating Pages,Click New Page in the sidebar to create a blank page.,Page Management,\"pages, create\"
Formatting Text,\"Select text, then press Ctrl+B for bold or use the formatting toolbar.\",Text Editing,\"bold,italic\"
Embedding Images,Drag an image or video file into the editor to embed media.,Media,
Building Tables,Type /table to insert a database table with rows and columns.,Database,tables
";

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    let mut vector: Vec<f32> = VOCABULARY
        .iter()
        .map(|stems| {
            stems
                .iter()
                .map(|stem| text.matches(stem).count())
                .sum::<usize>() as f32
        })
        .collect();
    vector.push(0.05);
    vector
}

/// Deterministic embedder that counts how many texts it embedded
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    embedded: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| keyword_vector(text)).collect())
    }
}

struct EchoGenerator {
    params: GenerationParams,
}

impl Generator for EchoGenerator {
    fn generate(&self, _prompt: &str, history: &[Turn]) -> Result<String> {
        Ok(format!(
            "Answer at temperature {} after {} turns",
            self.params.temperature,
            history.len()
        ))
    }
}

/// Factory whose generators report the parameters they were built with
#[derive(Debug, Default)]
pub struct RecordingFactory {
    created: Arc<Mutex<Vec<GenerationParams>>>,
}

impl RecordingFactory {
    pub fn created(&self) -> Vec<GenerationParams> {
        self.created.lock().expect("lock").clone()
    }
}

impl GeneratorFactory for RecordingFactory {
    fn create(
        &self,
        params: GenerationParams,
        _credential: &Credential,
    ) -> Result<Box<dyn Generator + Send + Sync>> {
        self.created.lock().expect("lock").push(params);
        Ok(Box::new(EchoGenerator { params }))
    }
}

pub fn write_docs_csv(dir: &Path) -> PathBuf {
    let path = dir.join("docs.csv");
    std::fs::write(&path, DOCS_CSV).expect("should write csv");
    path
}
