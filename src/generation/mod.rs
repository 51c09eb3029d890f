// Generation module
// Hosted language model access; the pipeline only sees the traits below

pub mod hub;


pub use hub::{HubClient, HubClientFactory};

use std::fmt;

use crate::config::{GenerationConfig, validate_max_length, validate_temperature};
use crate::session::Turn;
use crate::{HelperError, Result};

/// Environment variables checked for the API token, in order
pub const TOKEN_ENV_VARS: [&str; 2] = ["HUGGINGFACEHUB_API_TOKEN", "HF_TOKEN"];

/// API token for the inference endpoint, never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[inline]
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(HelperError::MissingCredential);
        }
        Ok(Self(token))
    }

    /// First non-empty token found in [`TOKEN_ENV_VARS`]
    #[inline]
    pub fn from_env() -> Option<Self> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find_map(|token| Self::new(token).ok())
    }

    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Sampling parameters a generator is constructed with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_length: u32,
}

impl GenerationParams {
    #[inline]
    pub fn new(temperature: f32, max_length: u32) -> Result<Self> {
        validate_temperature(temperature).map_err(|e| HelperError::Config(e.to_string()))?;
        validate_max_length(max_length).map_err(|e| HelperError::Config(e.to_string()))?;
        Ok(Self {
            temperature,
            max_length,
        })
    }
}

impl From<&GenerationConfig> for GenerationParams {
    #[inline]
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_length: config.max_length,
        }
    }
}

/// A language model bound to one set of [`GenerationParams`]
pub trait Generator {
    /// Produce a reply to `prompt`, with earlier turns passed as conversation context
    fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String>;
}

/// Builds generators; parameters are fixed at construction time
pub trait GeneratorFactory {
    fn create(
        &self,
        params: GenerationParams,
        credential: &Credential,
    ) -> Result<Box<dyn Generator + Send + Sync>>;
}
