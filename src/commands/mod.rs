
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::HelperError;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::generation::{Credential, HubClientFactory, TOKEN_ENV_VARS};
use crate::loader::load_records;
use crate::session::{
    ConversationSession, EXAMPLE_QUESTIONS, SessionContext, SessionEvent, SessionOutcome,
    WELCOME_MESSAGE, feature_categories,
};
use crate::store::{EmbeddingStore, SimilarityIndex};

/// One line of input in the chat loop
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Ask(String),
    Temperature(f32),
    MaxLength(u32),
    Token,
    Examples,
    Categories,
    History,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

/// Parse a chat input line; anything not starting with `/` is a question
#[inline]
pub fn parse_chat_command(line: &str) -> ChatCommand {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatCommand::Ask(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let argument = parts.next();

    match (name.as_str(), argument) {
        ("temperature" | "temp", Some(value)) => value.parse().map_or_else(
            |_| ChatCommand::Invalid(format!("'{}' is not a number", value)),
            ChatCommand::Temperature,
        ),
        ("max-length" | "max_length", Some(value)) => value.parse().map_or_else(
            |_| ChatCommand::Invalid(format!("'{}' is not a whole number", value)),
            ChatCommand::MaxLength,
        ),
        ("temperature" | "temp" | "max-length" | "max_length", None) => {
            ChatCommand::Invalid(format!("/{} needs a value", name))
        }
        ("token", _) => ChatCommand::Token,
        ("examples", _) => ChatCommand::Examples,
        ("categories", _) => ChatCommand::Categories,
        ("history", _) => ChatCommand::History,
        ("help", _) => ChatCommand::Help,
        ("quit" | "exit", _) => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command /{}", name)),
    }
}

/// Token from `--token`, falling back to the environment
#[inline]
pub fn resolve_credential(token: Option<&str>) -> Option<Credential> {
    token
        .and_then(|token| Credential::new(token).ok())
        .or_else(Credential::from_env)
}

/// Notice shown when an explicit CSV is paired with an index that will be reused as-is
fn reuse_hint(
    csv: Option<&Path>,
    force_refresh: bool,
    index_path: &Path,
    index_exists: bool,
) -> Option<String> {
    let csv = csv?;
    if force_refresh || !index_exists {
        return None;
    }
    Some(format!(
        "Reusing the existing index at {}; run 'docs-helper index --csv {} --force-refresh' to rebuild it from this CSV.",
        index_path.display(),
        csv.display()
    ))
}

/// Load the CSV and open (or build) the persisted index for it
async fn prepare_index(
    config: &Config,
    csv: Option<&Path>,
    force_refresh: bool,
) -> Result<(SimilarityIndex, OllamaClient)> {
    let data_path = csv.unwrap_or_else(|| config.data_path());
    let records = load_records(data_path)
        .with_context(|| format!("Failed to load records from {}", data_path.display()))?;
    info!(
        "Loaded {} records from {}",
        records.len(),
        data_path.display()
    );

    let client = OllamaClient::new(config).context("Failed to create Ollama client")?;
    let store = EmbeddingStore::new(config).with_progress(true);
    let index_exists = store.path().exists();

    if let Some(hint) = reuse_hint(csv, force_refresh, store.path(), index_exists) {
        warn!("{}", hint);
        eprintln!("{} {}", style("ℹ️").cyan(), hint);
    }

    if force_refresh || !index_exists {
        client.health_check().with_context(|| {
            format!(
                "Cannot reach Ollama at {}:{}, use 'docs-helper config' to update connection settings",
                config.ollama.host, config.ollama.port
            )
        })?;
    }

    let index = store
        .open_or_build(&records, &client, force_refresh)
        .await
        .context("Failed to open embedding store")?;

    Ok((index, client))
}

/// Build the index if needed and report what is stored
#[inline]
pub async fn build_index(config: &Config, csv: Option<&Path>, force_refresh: bool) -> Result<()> {
    let (index, _) = prepare_index(config, csv, force_refresh).await?;

    println!(
        "{} {} records indexed ({} dimensions)",
        style("✅").green(),
        index.len(),
        index.dimension()
    );
    println!("   Location: {}", config.vector_database_path().display());
    if !force_refresh {
        println!("   Use --force-refresh to re-embed after editing the CSV.");
    }

    Ok(())
}

/// Answer a single question without keeping history
#[inline]
pub async fn ask_question(
    config: &Config,
    question: &str,
    csv: Option<&Path>,
    token: Option<&str>,
) -> Result<()> {
    let Some(credential) = resolve_credential(token) else {
        eprintln!(
            "{} Provide a Hugging Face API token with --token or set {}",
            style("⚠️").yellow(),
            TOKEN_ENV_VARS.join(" / ")
        );
        return Err(HelperError::MissingCredential.into());
    };

    let (index, embedder) = prepare_index(config, csv, false).await?;
    let factory = HubClientFactory::new(config.generation.clone());
    let ctx = SessionContext {
        index: &index,
        embedder: &embedder,
        factory: &factory,
    };

    let mut session = ConversationSession::from_config(config)?.with_credential(Some(credential));
    let spinner = thinking_spinner();
    let answer = session.ask(question, &ctx);
    spinner.finish_and_clear();

    println!("{}", answer?.text);
    Ok(())
}

/// Interactive chat loop over a single conversation session
#[inline]
pub async fn run_chat(config: &Config, csv: Option<&Path>, token: Option<&str>) -> Result<()> {
    let (index, embedder) = prepare_index(config, csv, false).await?;
    let factory = HubClientFactory::new(config.generation.clone());
    let ctx = SessionContext {
        index: &index,
        embedder: &embedder,
        factory: &factory,
    };

    let mut session =
        ConversationSession::from_config(config)?.with_credential(resolve_credential(token));

    eprintln!("{}", style("Yes It Works - Documentation Helper").bold().cyan());
    eprintln!();
    eprintln!("{}", WELCOME_MESSAGE);
    eprintln!();
    eprintln!("{}", style("Type /help for commands.").dim());

    if !session.has_credential() {
        prompt_for_credential(&mut session, &ctx)?;
    }

    loop {
        let line: String = match Input::new()
            .with_prompt(style("You").bold().to_string())
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                warn!("Input closed: {}", e);
                break;
            }
        };

        let event = match parse_chat_command(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Help => {
                print_help();
                continue;
            }
            ChatCommand::Examples => {
                eprintln!("{}", style("Example Questions").bold().yellow());
                for example in EXAMPLE_QUESTIONS {
                    eprintln!("  - {}", example);
                }
                continue;
            }
            ChatCommand::Categories => {
                eprintln!("{}", style("Feature Categories").bold().yellow());
                for category in feature_categories() {
                    eprintln!("  - {}", category);
                }
                continue;
            }
            ChatCommand::History => {
                print_history(&session);
                continue;
            }
            ChatCommand::Token => {
                prompt_for_credential(&mut session, &ctx)?;
                continue;
            }
            ChatCommand::Invalid(message) => {
                eprintln!("{} {}", style("❌").red(), message);
                continue;
            }
            ChatCommand::Temperature(temperature) => SessionEvent::ChangeSettings {
                temperature,
                max_length: session.params().max_length,
            },
            ChatCommand::MaxLength(max_length) => SessionEvent::ChangeSettings {
                temperature: session.params().temperature,
                max_length,
            },
            ChatCommand::Ask(question) => SessionEvent::SubmitQuestion(question),
        };

        let spinner = if matches!(event, SessionEvent::SubmitQuestion(_)) {
            thinking_spinner()
        } else {
            ProgressBar::hidden()
        };
        let outcome = session.handle(event, &ctx);
        spinner.finish_and_clear();

        match outcome {
            Ok(SessionOutcome::Answered(answer)) => {
                println!();
                println!("{}", answer.text);
                println!();
            }
            Ok(SessionOutcome::SettingsChanged { changed }) => {
                let params = session.params();
                if changed {
                    eprintln!(
                        "{} Temperature {}, max length {}",
                        style("✅").green(),
                        params.temperature,
                        params.max_length
                    );
                } else {
                    eprintln!("Settings unchanged");
                }
            }
            Ok(SessionOutcome::CredentialAccepted) => {
                eprintln!("{} Token updated", style("✅").green());
            }
            Err(HelperError::MissingCredential) => {
                eprintln!(
                    "{} Please enter your Hugging Face API token to continue.",
                    style("⚠️").yellow()
                );
                prompt_for_credential(&mut session, &ctx)?;
            }
            Err(e) => {
                error!("Chat interaction failed: {}", e);
                eprintln!("{} {}", style("❌").red(), e);
            }
        }
    }

    eprintln!("Goodbye!");
    Ok(())
}

fn prompt_for_credential(
    session: &mut ConversationSession,
    ctx: &SessionContext<'_>,
) -> Result<()> {
    let token = Password::new()
        .with_prompt("Enter your Hugging Face API token (https://huggingface.co/settings/tokens)")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read API token")?;

    match session.handle(SessionEvent::EnterCredential(token), ctx) {
        Ok(_) => eprintln!("{} Token accepted", style("✅").green()),
        Err(e) => eprintln!("{} {}", style("⚠️").yellow(), e),
    }
    Ok(())
}

fn thinking_spinner() -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
    );
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_help() {
    eprintln!("{}", style("Commands").bold().yellow());
    eprintln!("  /temperature <0.0-1.0>   Change response creativity");
    eprintln!("  /max-length <64-1024>    Change maximum response length");
    eprintln!("  /token                   Enter a new API token");
    eprintln!("  /examples                Show example questions");
    eprintln!("  /categories              Show feature categories");
    eprintln!("  /history                 Show this conversation");
    eprintln!("  /quit                    Leave the chat");
}

fn print_history(session: &ConversationSession) {
    if session.turns().is_empty() {
        eprintln!("No questions asked yet.");
        return;
    }
    for (position, turn) in session.history_as_pairs().iter().enumerate() {
        eprintln!(
            "{} {}",
            style(format!("Q{}:", position + 1)).bold(),
            turn.question
        );
        eprintln!("{}", turn.answer);
        eprintln!();
    }
}

/// Print configuration, Ollama reachability and index summary
#[inline]
pub async fn show_status(config: &Config, token: Option<&str>) -> Result<()> {
    println!("{}", style("📊 Docs Helper Status").bold().cyan());
    println!();

    println!("{}", style("Ollama").bold().yellow());
    match OllamaClient::new(config).map(|client| client.health_check()) {
        Ok(Ok(())) => println!(
            "   ✅ Connected at {}:{} (model {})",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Ok(Err(e)) | Err(e) => println!("   ❌ Unavailable: {}", e),
    }

    println!();
    println!("{}", style("Generation").bold().yellow());
    println!("   Endpoint: {}", config.generation.endpoint);
    println!("   Model: {}", config.generation.model);
    println!(
        "   Temperature: {}, max length: {}",
        config.generation.temperature, config.generation.max_length
    );
    if resolve_credential(token).is_some() {
        println!("   🔑 API token available");
    } else {
        println!(
            "   ⚠️  No API token (use --token or set {})",
            TOKEN_ENV_VARS.join(" / ")
        );
    }

    println!();
    println!("{}", style("Index").bold().yellow());
    println!("   Data file: {}", config.data_path().display());
    let status = EmbeddingStore::new(config)
        .status()
        .await
        .context("Failed to read index status")?;
    match (status.record_count, status.dimension) {
        (Some(records), Some(dimension)) => println!(
            "   ✅ {} records ({} dimensions) at {}",
            records,
            dimension,
            status.path.display()
        ),
        _ => {
            println!("   ⚠️  No index at {}", status.path.display());
            println!("   Use 'docs-helper index' to build it.");
        }
    }

    Ok(())
}
