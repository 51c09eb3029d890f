// Conversation session
// Chat history and pipeline configuration for one user, driven by events


use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::generation::{Credential, GenerationParams, GeneratorFactory};
use crate::loader::Category;
use crate::pipeline::{Answer, AnswerPipeline, PipelineSettings};
use crate::store::SimilarityIndex;
use crate::Result;

pub const WELCOME_MESSAGE: &str = "Hi! I'm your Yes It Works documentation helper. \
I can help you with:
- Creating and managing pages
- Text formatting and editing
- Media handling
- Database features
- Collaboration tools

What would you like to know?";

pub const EXAMPLE_QUESTIONS: [&str; 5] = [
    "How do I create a new page?",
    "What formatting options are available?",
    "How can I create tables?",
    "How do I share pages with others?",
    "Can I work offline?",
];

/// Categories offered to the user as browsing hints
#[inline]
pub fn feature_categories() -> &'static [Category] {
    &Category::ALL
}

/// One question and the answer it received; the session history is a sequence of these pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SubmitQuestion(String),
    ChangeSettings { temperature: f32, max_length: u32 },
    EnterCredential(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Answered(Answer),
    SettingsChanged { changed: bool },
    CredentialAccepted,
}

/// Shared, read-only collaborators a question is answered against
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    pub index: &'a SimilarityIndex,
    pub embedder: &'a (dyn Embedder + Sync),
    pub factory: &'a (dyn GeneratorFactory + Sync),
}

/// Turns, generation parameters and credential for one conversation
///
/// The pipeline is built lazily on the next question and dropped whenever
/// the parameters or the credential change.
#[derive(Debug)]
pub struct ConversationSession {
    turns: Vec<Turn>,
    params: GenerationParams,
    settings: PipelineSettings,
    credential: Option<Credential>,
    pipeline: Option<AnswerPipeline>,
}

impl ConversationSession {
    #[inline]
    pub fn new(params: GenerationParams, settings: PipelineSettings) -> Self {
        Self {
            turns: Vec::new(),
            params,
            settings,
            credential: None,
            pipeline: None,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let params =
            GenerationParams::new(config.generation.temperature, config.generation.max_length)?;
        let settings = PipelineSettings::from_config(&config.retrieval)?;
        Ok(Self::new(params, settings))
    }

    #[inline]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[inline]
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    #[inline]
    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Whether a pipeline for the current parameters has been built
    #[inline]
    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    #[inline]
    pub fn append_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// History in chronological order, one [`Turn`] per (question, answer) pair
    ///
    /// This is what the answer pipeline replays as conversation context.
    #[inline]
    pub fn history_as_pairs(&self) -> &[Turn] {
        &self.turns
    }

    /// Validate and apply new generation parameters
    ///
    /// Returns whether anything changed; a change drops the built pipeline.
    #[inline]
    pub fn update_config(&mut self, temperature: f32, max_length: u32) -> Result<bool> {
        let params = GenerationParams::new(temperature, max_length)?;
        if params == self.params {
            return Ok(false);
        }

        info!(
            "Generation settings changed to temperature {}, max length {}",
            temperature, max_length
        );
        self.params = params;
        self.pipeline = None;
        Ok(true)
    }

    #[inline]
    pub fn set_credential(&mut self, token: impl Into<String>) -> Result<()> {
        let credential = Credential::new(token)?;
        if self.pipeline.is_some() {
            debug!("Credential replaced, dropping existing pipeline");
        }
        self.credential = Some(credential);
        self.pipeline = None;
        Ok(())
    }

    /// Answer `question` with the current history and record the turn
    ///
    /// A failed question leaves the history untouched.
    #[inline]
    pub fn ask(&mut self, question: &str, ctx: &SessionContext<'_>) -> Result<Answer> {
        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => AnswerPipeline::new(
                self.params,
                self.settings.clone(),
                self.credential.as_ref(),
                ctx.factory,
            )?,
        };

        let result = pipeline.answer(
            question,
            self.history_as_pairs(),
            ctx.index,
            ctx.embedder,
        );
        self.pipeline = Some(pipeline);

        match result {
            Ok(answer) => {
                self.append_turn(question.trim(), answer.text.clone());
                Ok(answer)
            }
            Err(e) => {
                warn!("Question failed, history unchanged: {}", e);
                Err(e)
            }
        }
    }

    #[inline]
    pub fn handle(
        &mut self,
        event: SessionEvent,
        ctx: &SessionContext<'_>,
    ) -> Result<SessionOutcome> {
        match event {
            SessionEvent::SubmitQuestion(question) => {
                self.ask(&question, ctx).map(SessionOutcome::Answered)
            }
            SessionEvent::ChangeSettings {
                temperature,
                max_length,
            } => self
                .update_config(temperature, max_length)
                .map(|changed| SessionOutcome::SettingsChanged { changed }),
            SessionEvent::EnterCredential(token) => {
                self.set_credential(token)?;
                Ok(SessionOutcome::CredentialAccepted)
            }
        }
    }
}
