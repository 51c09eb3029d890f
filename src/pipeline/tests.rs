use super::*;
use crate::loader::Record;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts topic words, one dimension per topic
struct TopicEmbedder;

impl Embedder for TopicEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                let count = |words: &[&str]| {
                    words
                        .iter()
                        .map(|word| text.matches(word).count())
                        .sum::<usize>() as f32
                };
                vec![
                    count(&["page"]),
                    count(&["text", "format"]),
                    count(&["image", "media"]),
                    count(&["table", "database"]),
                    0.1,
                ]
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
struct Call {
    prompt: String,
    history: Vec<Turn>,
}

struct StubGenerator {
    reply: std::result::Result<String, String>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Generator for StubGenerator {
    fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String> {
        self.calls.lock().expect("lock").push(Call {
            prompt: prompt.to_string(),
            history: history.to_vec(),
        });
        self.reply.clone().map_err(HelperError::Generation)
    }
}

struct StubFactory {
    reply: std::result::Result<String, String>,
    created: AtomicUsize,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl StubFactory {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            created: AtomicUsize::new(0),
            calls: Arc::default(),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            created: AtomicUsize::new(0),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }
}

impl GeneratorFactory for StubFactory {
    fn create(
        &self,
        _params: GenerationParams,
        _credential: &Credential,
    ) -> Result<Box<dyn Generator + Send + Sync>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubGenerator {
            reply: self.reply.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

fn record(title: &str, body: &str, category: Category) -> Record {
    Record {
        title: title.to_string(),
        body: body.to_string(),
        category,
        keywords: vec![],
        source: "docs.csv".to_string(),
    }
}

fn docs_index() -> SimilarityIndex {
    let records = vec![
        record(
            "Creating Pages",
            "Click New Page in the sidebar to create a page.",
            Category::PageManagement,
        ),
        record(
            "Formatting Text",
            "Select text and pick bold or italic from the toolbar.",
            Category::TextEditing,
        ),
        record(
            "Embedding Images",
            "Drag an image file onto the editor.",
            Category::Media,
        ),
        record(
            "Building Tables",
            "Insert a database table and add rows.",
            Category::Database,
        ),
    ];
    SimilarityIndex::build(&records, &TopicEmbedder).expect("index should build")
}

fn params() -> GenerationParams {
    GenerationParams::new(0.7, 512).expect("params should be valid")
}

fn credential() -> Credential {
    Credential::new("hf_test").expect("token should be accepted")
}

fn pipeline_with(factory: &StubFactory, top_k: usize) -> AnswerPipeline {
    let settings = PipelineSettings {
        top_k,
        ..PipelineSettings::default()
    };
    AnswerPipeline::new(params(), settings, Some(&credential()), factory)
        .expect("pipeline should construct")
}

#[test]
fn render_substitutes_placeholders() {
    let template = PromptTemplate::new("C={context} Q={question} again {question}")
        .expect("template should be valid");

    assert_eq!(
        template.render("ctx", "why?"),
        "C=ctx Q=why? again why?"
    );
}

#[test]
fn render_is_single_pass() {
    let template = PromptTemplate::default();
    let rendered = template.render("notes about {question}", "what is {context}?");

    assert!(rendered.contains("Context: notes about {question}"));
    assert!(rendered.contains("Question: what is {context}?"));
}

#[test]
fn render_keeps_unrelated_braces() {
    let template = PromptTemplate::new("{ {context} } {other} {question}{")
        .expect("template should be valid");

    assert_eq!(template.render("a", "b"), "{ a } {other} b{");
}

#[test]
fn template_requires_both_placeholders() {
    assert!(matches!(
        PromptTemplate::new("Context: {context}"),
        Err(HelperError::Config(_))
    ));
    assert!(matches!(
        PromptTemplate::new("Question: {question}"),
        Err(HelperError::Config(_))
    ));
}

#[test]
fn default_template_suggests_related_topics() {
    let template = PromptTemplate::default();
    assert!(template.as_str().contains("{context}"));
    assert!(template.as_str().contains("{question}"));
    assert!(template.as_str().contains("related topics"));
    assert!(template.as_str().contains("concise and helpful"));
}

#[test]
fn settings_from_retrieval_config() {
    let config = RetrievalConfig {
        top_k: 4,
        prompt_template: "{question} / {context}".to_string(),
        ..RetrievalConfig::default()
    };
    let settings = PipelineSettings::from_config(&config).expect("settings should load");

    assert_eq!(settings.top_k, 4);
    assert_eq!(settings.template.as_str(), "{question} / {context}");

    let bad = RetrievalConfig {
        top_k: 0,
        ..RetrievalConfig::default()
    };
    assert!(PipelineSettings::from_config(&bad).is_err());
}

#[test]
fn missing_credential_blocks_construction() {
    let factory = StubFactory::replying("unused");
    let result = AnswerPipeline::new(params(), PipelineSettings::default(), None, &factory);

    assert!(matches!(result, Err(HelperError::MissingCredential)));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn answer_ranks_matching_record_first() {
    let factory = StubFactory::replying("  Click New Page in the sidebar.  ");
    let pipeline = pipeline_with(&factory, 3);

    let answer = pipeline
        .answer("How do I create a new page?", &[], &docs_index(), &TopicEmbedder)
        .expect("answer should succeed");

    assert_eq!(answer.sources.len(), 3);
    assert_eq!(answer.sources[0], "Creating Pages");
    assert_eq!(answer.categories[0], Category::PageManagement);
    assert!(answer.text.starts_with("Click New Page in the sidebar.\n\n*Related categories: "));
    assert!(answer.text.contains("Related categories: Page Management"));
    assert!(answer.text.ends_with('*'));
}

#[test]
fn answer_with_single_hit_has_exact_suffix() {
    let factory = StubFactory::replying("Click New Page.");
    let pipeline = pipeline_with(&factory, 1);

    let answer = pipeline
        .answer("How do I create a new page?", &[], &docs_index(), &TopicEmbedder)
        .expect("answer should succeed");

    assert_eq!(
        answer.text,
        "Click New Page.\n\n*Related categories: Page Management*"
    );
    assert_eq!(answer.categories, vec![Category::PageManagement]);
}

#[test]
fn prompt_carries_context_and_history_is_structural() {
    let factory = StubFactory::replying("ok");
    let pipeline = pipeline_with(&factory, 2);
    let history = vec![Turn {
        question: "What is this?".to_string(),
        answer: "A docs helper.".to_string(),
    }];

    pipeline
        .answer("How do I create a new page?", &history, &docs_index(), &TopicEmbedder)
        .expect("answer should succeed");

    let calls = factory.calls();
    assert_eq!(calls.len(), 1);
    let prompt = &calls[0].prompt;
    assert!(prompt.contains("Title: Creating Pages\nContent: Click New Page"));
    assert!(prompt.contains("Question: How do I create a new page?"));
    assert!(!prompt.contains("A docs helper."));
    assert_eq!(calls[0].history, history);
}

#[test]
fn duplicate_categories_are_listed_once() {
    let records = vec![
        record("Creating Pages", "New page button.", Category::PageManagement),
        record("Moving Pages", "Drag a page in the sidebar.", Category::PageManagement),
        record("Building Tables", "Insert a database table.", Category::Database),
    ];
    let index = SimilarityIndex::build(&records, &TopicEmbedder).expect("index should build");
    let factory = StubFactory::replying("Done.");
    let pipeline = pipeline_with(&factory, 3);

    let answer = pipeline
        .answer("page help", &[], &index, &TopicEmbedder)
        .expect("answer should succeed");

    assert_eq!(
        answer.categories,
        vec![Category::PageManagement, Category::Database]
    );
    assert_eq!(
        answer.text,
        "Done.\n\n*Related categories: Page Management, Database*"
    );
}

#[test]
fn generation_failure_is_surfaced() {
    let factory = StubFactory::failing("HTTP 503");
    let pipeline = pipeline_with(&factory, 3);

    let result = pipeline.answer("How do I create a new page?", &[], &docs_index(), &TopicEmbedder);

    assert!(matches!(result, Err(HelperError::Generation(ref msg)) if msg.contains("503")));
}

#[test]
fn empty_question_is_rejected_before_generation() {
    let factory = StubFactory::replying("unused");
    let pipeline = pipeline_with(&factory, 3);

    let result = pipeline.answer("   ", &[], &docs_index(), &TopicEmbedder);

    assert!(matches!(result, Err(HelperError::MalformedInput(_))));
    assert!(factory.calls().is_empty());
}

#[test]
fn suffix_is_omitted_without_categories() {
    assert_eq!(with_related_categories("Plain.", &[]), "Plain.");
    assert_eq!(
        with_related_categories("Hi.", &[Category::Media, Category::General]),
        "Hi.\n\n*Related categories: Media, General*"
    );
}
