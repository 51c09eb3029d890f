// Embeddings module
// Turns record text into vectors; the Ollama client is the production backend

pub mod ollama;

pub use ollama::OllamaClient;

use crate::Result;

/// Anything that can map text onto fixed-dimension vectors
///
/// Implementations must return one vector per input, in input order, and every
/// vector from one embedder must share the same dimension.
pub trait Embedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| crate::HelperError::Embedding("Embedder returned no vector".to_string()))
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}
