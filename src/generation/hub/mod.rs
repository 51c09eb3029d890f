
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

use super::{Credential, GenerationParams, Generator, GeneratorFactory};
use crate::config::GenerationConfig;
use crate::session::Turn;
use crate::{HelperError, Result};

const CHAT_COMPLETIONS_SEGMENTS: [&str; 3] = ["v1", "chat", "completions"];

/// Append the chat completions route to `endpoint`, keeping any path prefix
fn chat_completions_url(mut endpoint: Url) -> Result<Url> {
    let invalid = HelperError::Config(format!("Endpoint {} cannot carry a path", endpoint));
    endpoint
        .path_segments_mut()
        .map_err(|()| invalid)?
        .pop_if_empty()
        .extend(CHAT_COMPLETIONS_SEGMENTS);
    Ok(endpoint)
}

/// Client for an OpenAI-compatible chat completions endpoint (Hugging Face router by default)
#[derive(Debug, Clone)]
pub struct HubClient {
    url: Url,
    model: String,
    params: GenerationParams,
    credential: Credential,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Message(String),
    Detailed { message: String },
}

impl HubClient {
    #[inline]
    pub fn new(
        config: &GenerationConfig,
        params: GenerationParams,
        credential: Credential,
    ) -> Result<Self> {
        let url = chat_completions_url(
            config
                .endpoint_url()
                .map_err(|e| HelperError::Config(e.to_string()))?,
        )?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            url,
            model: config.model.clone(),
            params,
            credential,
            agent,
        })
    }

    #[inline]
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    fn build_request<'a>(&'a self, prompt: &'a str, history: &'a [Turn]) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for turn in history {
            messages.push(ChatMessage {
                role: "user",
                content: &turn.question,
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: &turn.answer,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.params.temperature,
            max_tokens: self.params.max_length,
            stream: false,
        }
    }
}

impl Generator for HubClient {
    fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String> {
        let request = self.build_request(prompt, history);
        let request_json = serde_json::to_string(&request).map_err(|e| {
            HelperError::Generation(format!("Failed to serialize generation request: {}", e))
        })?;

        debug!(
            "Requesting completion from {} ({} history turns, temperature {}, max tokens {})",
            self.url,
            history.len(),
            self.params.temperature,
            self.params.max_length
        );

        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("Authorization", format!("Bearer {}", self.credential.expose()))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| {
                error!("Generation request to {} failed: {}", self.url, e);
                HelperError::Generation(format!("Request to inference endpoint failed: {}", e))
            })?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().map_err(|e| {
            HelperError::Generation(format!("Failed to read generation response: {}", e))
        })?;

        if !(200..300).contains(&status) {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| match e.error {
                    ErrorBody::Message(message) | ErrorBody::Detailed { message } => message,
                })
                .unwrap_or(body);
            error!("Inference endpoint returned HTTP {}: {}", status, detail);
            return Err(HelperError::Generation(match status {
                401 | 403 => format!("Authentication failed (HTTP {}): {}", status, detail),
                _ => format!("Inference endpoint returned HTTP {}: {}", status, detail),
            }));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            HelperError::Generation(format!("Failed to parse generation response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                HelperError::Generation("Inference endpoint returned no completion".to_string())
            })?;

        info!("Received completion of {} characters", content.len());
        Ok(content)
    }
}

/// Creates [`HubClient`]s from the generation section of the config
#[derive(Debug, Clone)]
pub struct HubClientFactory {
    config: GenerationConfig,
}

impl HubClientFactory {
    #[inline]
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }
}

impl GeneratorFactory for HubClientFactory {
    #[inline]
    fn create(
        &self,
        params: GenerationParams,
        credential: &Credential,
    ) -> Result<Box<dyn Generator + Send + Sync>> {
        info!(
            "Constructing generator for {} (temperature {}, max length {})",
            self.config.model, params.temperature, params.max_length
        );
        Ok(Box::new(HubClient::new(
            &self.config,
            params,
            credential.clone(),
        )?))
    }
}
