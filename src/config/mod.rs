// Configuration management module
// Handles the TOML config file for embedding, generation and retrieval settings

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, GenerationConfig, OllamaConfig, RetrievalConfig, validate_max_length,
    validate_prompt_template, validate_temperature,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
