// Embedding store
// In-memory similarity index over embedded records, persisted through LanceDB


pub mod lancedb;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::loader::Record;
use crate::{HelperError, Result};

/// Number of records retrieved per question unless configured otherwise
pub const DEFAULT_TOP_K: usize = 3;

/// A record together with its embedding and its position in the loaded sequence
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRecord {
    pub record: Record,
    pub vector: Vec<f32>,
    pub source_index: usize,
}

/// One query hit, higher scores are more similar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord<'a> {
    pub entry: &'a EmbeddedRecord,
    pub score: f32,
}

impl ScoredRecord<'_> {
    #[inline]
    pub fn record(&self) -> &Record {
        &self.entry.record
    }
}

/// Exact cosine-similarity index over a fixed set of records
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    entries: Vec<EmbeddedRecord>,
    dimension: usize,
}

impl SimilarityIndex {
    /// Embed every record's content and index the results
    ///
    /// Records keep their input position as `source_index`.
    #[inline]
    pub fn build<E: Embedder + ?Sized>(records: &[Record], embedder: &E) -> Result<Self> {
        if records.is_empty() {
            return Err(HelperError::MalformedInput(
                "No documentation records to index".to_string(),
            ));
        }

        let texts: Vec<String> = records.iter().map(Record::content).collect();
        let vectors = embedder.embed_batch(&texts)?;

        if vectors.len() != records.len() {
            return Err(HelperError::Embedding(format!(
                "Embedder returned {} vectors for {} records",
                vectors.len(),
                records.len()
            )));
        }

        let entries = records
            .iter()
            .cloned()
            .zip(vectors)
            .enumerate()
            .map(|(source_index, (record, vector))| EmbeddedRecord {
                record,
                vector,
                source_index,
            })
            .collect();

        let index = Self::from_entries(entries)?;
        info!(
            "Built similarity index with {} records ({} dimensions)",
            index.len(),
            index.dimension
        );
        Ok(index)
    }

    /// Assemble an index from already embedded records, ordered by `source_index`
    #[inline]
    pub fn from_entries(mut entries: Vec<EmbeddedRecord>) -> Result<Self> {
        entries.sort_by_key(|entry| entry.source_index);

        let dimension = entries.first().map_or(0, |entry| entry.vector.len());
        if dimension == 0 {
            return Err(HelperError::Embedding(
                "Cannot index empty embedding vectors".to_string(),
            ));
        }

        if let Some(bad) = entries.iter().find(|entry| entry.vector.len() != dimension) {
            return Err(HelperError::Embedding(format!(
                "Record '{}' has {} dimensions, expected {}",
                bad.record.title,
                bad.vector.len(),
                dimension
            )));
        }

        Ok(Self { entries, dimension })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn entries(&self) -> &[EmbeddedRecord] {
        &self.entries
    }

    /// Return up to `k` records nearest to `vector`
    ///
    /// Results are sorted by descending similarity; equal scores keep
    /// insertion order.
    #[inline]
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord<'_>>> {
        if vector.len() != self.dimension {
            return Err(HelperError::Embedding(format!(
                "Query vector has {} dimensions, index has {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<ScoredRecord<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredRecord {
                entry,
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.source_index.cmp(&b.entry.source_index))
        });
        scored.truncate(k);

        debug!("Query matched {} of {} records", scored.len(), self.len());
        Ok(scored)
    }

    /// Embed `text` and query with the resulting vector
    #[inline]
    pub fn query_text<E: Embedder + ?Sized>(
        &self,
        text: &str,
        embedder: &E,
        k: usize,
    ) -> Result<Vec<ScoredRecord<'_>>> {
        let vector = embedder.embed(text)?;
        self.query(&vector, k)
    }

    #[inline]
    pub async fn persist_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        lancedb::write_index(path.as_ref(), self).await
    }

    /// Load a previously persisted index
    ///
    /// Fails with [`HelperError::IndexNotFound`] when nothing was persisted at `path`.
    #[inline]
    pub async fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let entries = lancedb::read_entries(path.as_ref()).await?;
        Self::from_entries(entries)
    }
}

/// Cosine similarity, zero when either vector has no magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Summary of what is persisted on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub path: PathBuf,
    pub record_count: Option<usize>,
    pub dimension: Option<usize>,
}

/// Owns the on-disk location of the index and the load-or-rebuild policy
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
    show_progress: bool,
}

impl EmbeddingStore {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self::at(config.vector_database_path())
    }

    #[inline]
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            show_progress: false,
        }
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reuse the persisted index when present, otherwise build and persist one
    ///
    /// Reuse is decided by the presence of the index directory alone. The
    /// records are not compared against what was persisted, so edits to the
    /// source data are only picked up with `force_refresh`.
    #[inline]
    pub async fn open_or_build<E: Embedder + Sync + ?Sized>(
        &self,
        records: &[Record],
        embedder: &E,
        force_refresh: bool,
    ) -> Result<SimilarityIndex> {
        if !force_refresh && self.path.exists() {
            match SimilarityIndex::load_from(&self.path).await {
                Ok(index) => {
                    info!(
                        "Loaded existing similarity index from {}",
                        self.path.display()
                    );
                    return Ok(index);
                }
                Err(HelperError::IndexNotFound(path)) => {
                    warn!("No usable index at {}, rebuilding", path);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Creating new similarity index for {} records", records.len());
        let bar = self.progress_bar(records.len());
        let built = SimilarityIndex::build(records, embedder);
        bar.finish_and_clear();
        let index = built?;

        index.persist_to(&self.path).await?;
        info!("Persisted similarity index to {}", self.path.display());
        Ok(index)
    }

    #[inline]
    pub async fn status(&self) -> Result<IndexStatus> {
        match SimilarityIndex::load_from(&self.path).await {
            Ok(index) => Ok(IndexStatus {
                path: self.path.clone(),
                record_count: Some(index.len()),
                dimension: Some(index.dimension()),
            }),
            Err(HelperError::IndexNotFound(_)) => Ok(IndexStatus {
                path: self.path.clone(),
                record_count: None,
                dimension: None,
            }),
            Err(e) => Err(e),
        }
    }

    fn progress_bar(&self, record_count: usize) -> ProgressBar {
        if self.show_progress && console::user_attended_stderr() {
            let bar = ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("{spinner} Embedding {msg}")
                    .expect("style template is valid"),
            );
            bar.set_message(format!("{} records", record_count));
            bar.enable_steady_tick(std::time::Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        }
    }
}
