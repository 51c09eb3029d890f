// Answer pipeline
// Retrieval, prompt assembly and generation for a single question

#[cfg(test)]
mod tests;

use itertools::Itertools;
use std::fmt;
use tracing::{debug, info};

use crate::config::{RetrievalConfig, validate_prompt_template};
use crate::embeddings::Embedder;
use crate::generation::{Credential, GenerationParams, Generator, GeneratorFactory};
use crate::loader::Category;
use crate::session::Turn;
use crate::store::{DEFAULT_TOP_K, SimilarityIndex};
use crate::{HelperError, Result};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// Template used when no custom one is configured
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Answer the question based on the context below. \
Be concise and helpful. If the context does not fully answer the question, \
suggest related topics from the documentation the user could explore instead of refusing.

Context: {context}

Question: {question}

Answer: ";

/// Prompt text with `{context}` and `{question}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    #[inline]
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        validate_prompt_template(&template).map_err(|e| HelperError::Config(e.to_string()))?;
        Ok(Self(template))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute both placeholders in one pass
    ///
    /// Placeholder text inside `context` or `question` is left as is.
    #[inline]
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut rendered = String::with_capacity(self.0.len() + context.len() + question.len());
        let mut rest = self.0.as_str();

        while let Some(start) = rest.find('{') {
            let (before, tail) = rest.split_at(start);
            rendered.push_str(before);

            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = after;
            } else {
                rendered.push('{');
                rest = tail.strip_prefix('{').unwrap_or_default();
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

impl Default for PromptTemplate {
    #[inline]
    fn default() -> Self {
        Self(DEFAULT_PROMPT_TEMPLATE.to_string())
    }
}

/// Retrieval side of the pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub template: PromptTemplate,
}

impl PipelineSettings {
    #[inline]
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| HelperError::Config(e.to_string()))?;
        Ok(Self {
            top_k: config.top_k,
            template: PromptTemplate::new(config.prompt_template.clone())?,
        })
    }
}

impl Default for PipelineSettings {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            template: PromptTemplate::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Generated reply including the related categories suffix
    pub text: String,
    /// Categories of the retrieved records, first-seen order
    pub categories: Vec<Category>,
    /// Titles of the retrieved records, best match first
    pub sources: Vec<String>,
}

/// A generator bound to fixed parameters plus the retrieval settings
///
/// Parameter changes require a new pipeline; nothing here is mutable.
pub struct AnswerPipeline {
    generator: Box<dyn Generator + Send + Sync>,
    params: GenerationParams,
    settings: PipelineSettings,
}

impl AnswerPipeline {
    /// Fails with [`HelperError::MissingCredential`] before the factory is used
    #[inline]
    pub fn new(
        params: GenerationParams,
        settings: PipelineSettings,
        credential: Option<&Credential>,
        factory: &dyn GeneratorFactory,
    ) -> Result<Self> {
        let credential = credential.ok_or(HelperError::MissingCredential)?;
        let generator = factory.create(params, credential)?;

        info!(
            "Answer pipeline ready (top_k {}, temperature {}, max length {})",
            settings.top_k, params.temperature, params.max_length
        );
        Ok(Self {
            generator,
            params,
            settings,
        })
    }

    #[inline]
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    #[inline]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[inline]
    pub fn answer<E: Embedder + ?Sized>(
        &self,
        question: &str,
        history: &[Turn],
        index: &SimilarityIndex,
        embedder: &E,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(HelperError::MalformedInput("Question is empty".to_string()));
        }

        let hits = index.query_text(question, embedder, self.settings.top_k)?;
        debug!(
            "Retrieved {} records for question: {}",
            hits.len(),
            question
        );

        let context = hits.iter().map(|hit| hit.record().content()).join("\n\n");
        let prompt = self.settings.template.render(&context, question);

        let generated = self.generator.generate(&prompt, history)?;

        let categories: Vec<Category> = hits
            .iter()
            .map(|hit| hit.record().category)
            .unique()
            .collect();
        let sources = hits
            .iter()
            .map(|hit| hit.record().title.clone())
            .collect();

        Ok(Answer {
            text: with_related_categories(generated.trim(), &categories),
            categories,
            sources,
        })
    }
}

impl fmt::Debug for AnswerPipeline {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerPipeline")
            .field("params", &self.params)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Append the `Related categories` line when any were retrieved
#[inline]
pub fn with_related_categories(text: &str, categories: &[Category]) -> String {
    if categories.is_empty() {
        return text.to_string();
    }
    format!(
        "{}\n\n*Related categories: {}*",
        text,
        categories.iter().join(", ")
    )
}
