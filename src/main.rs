use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_helper::commands::{ask_question, build_index, run_chat, show_status};
use docs_helper::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-helper")]
#[command(about = "Answers questions about your documentation CSV with a hosted language model")]
#[command(version)]
struct Cli {
    /// Hugging Face API token. Visible in the process list and shell history;
    /// prefer setting HUGGINGFACEHUB_API_TOKEN or HF_TOKEN, or entering it at the chat prompt
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, generation and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the documentation CSV, reusing a persisted index when present
    Index {
        /// CSV file to index instead of the configured data path
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Rebuild the index even if one is already persisted
        #[arg(long)]
        force_refresh: bool,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// CSV file to answer from instead of the configured data path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Start an interactive chat session
    Chat {
        /// CSV file to answer from instead of the configured data path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show configuration, Ollama connectivity and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir()?;
    let token = cli.token.as_deref();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Index { csv, force_refresh } => {
            let config = Config::load(&config_dir)?;
            build_index(&config, csv.as_deref(), force_refresh).await?;
        }
        Commands::Ask { question, csv } => {
            let config = Config::load(&config_dir)?;
            ask_question(&config, &question, csv.as_deref(), token).await?;
        }
        Commands::Chat { csv } => {
            let config = Config::load(&config_dir)?;
            run_chat(&config, csv.as_deref(), token).await?;
        }
        Commands::Status => {
            let config = Config::load(&config_dir)?;
            show_status(&config, token).await?;
        }
    }

    Ok(())
}
