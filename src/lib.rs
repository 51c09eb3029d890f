use thiserror::Error;

pub type Result<T> = std::result::Result<T, HelperError>;

#[derive(Error, Debug)]
pub enum HelperError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("No persisted index found at {0}")]
    IndexNotFound(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Missing API credential: enter your Hugging Face API token to continue")]
    MissingCredential,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod loader;
pub mod pipeline;
pub mod session;
pub mod store;
