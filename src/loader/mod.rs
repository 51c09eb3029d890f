//! CSV documentation loader
//!
//! Turns the documentation spreadsheet into [`Record`]s. The file must have a
//! header row with `Title`, `Content` and `Category` columns; `Keywords` is
//! optional and holds a comma-separated list.


use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::{HelperError, Result};

const TITLE_COLUMN: &str = "Title";
const CONTENT_COLUMN: &str = "Content";
const CATEGORY_COLUMN: &str = "Category";
const KEYWORDS_COLUMN: &str = "Keywords";

/// Feature area a documentation entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    PageManagement,
    TextEditing,
    Media,
    Database,
    Collaboration,
    Integrations,
    General,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::PageManagement,
        Category::TextEditing,
        Category::Media,
        Category::Database,
        Category::Collaboration,
        Category::Integrations,
        Category::General,
    ];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::PageManagement => "Page Management",
            Category::TextEditing => "Text Editing",
            Category::Media => "Media",
            Category::Database => "Database",
            Category::Collaboration => "Collaboration",
            Category::Integrations => "Integrations",
            Category::General => "General",
        }
    }
}

impl fmt::Display for Category {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = HelperError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| HelperError::MalformedInput(format!("Unknown category '{}'", trimmed)))
    }
}

/// One documentation entry, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub body: String,
    pub category: Category,
    pub keywords: Vec<String>,
    /// Path of the file this record was read from
    pub source: String,
}

impl Record {
    /// The text that gets embedded and handed to the model as context
    #[inline]
    pub fn content(&self) -> String {
        format!(
            "Title: {}\nContent: {}\nCategory: {}",
            self.title, self.body, self.category
        )
    }
}

/// Split a keyword cell into trimmed, non-empty, de-duplicated entries
#[inline]
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keywords.iter().any(|existing| existing == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}

/// Load every row of the CSV at `path`, in file order
#[inline]
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    info!("Loading documentation from {}", path.display());

    let file = File::open(path)?;
    load_records_from_reader(file, &path.display().to_string())
}

/// Load records from any reader; `source` is recorded on every record
#[inline]
pub fn load_records_from_reader<R: Read>(reader: R, source: &str) -> Result<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| HelperError::MalformedInput(format!("Failed to read header row: {}", e)))?
        .clone();
    let columns = ColumnIndices::from_headers(&headers)?;

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|e| HelperError::MalformedInput(format!("Invalid CSV row: {}", e)))?;
        let line = row.position().map_or(0, csv::Position::line);
        records.push(columns.parse_row(&row, line, source)?);
    }

    info!("Loaded {} documentation records", records.len());
    Ok(records)
}

struct ColumnIndices {
    title: usize,
    content: usize,
    category: usize,
    keywords: Option<usize>,
}

impl ColumnIndices {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim_start_matches('\u{feff}').trim() == name)
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                HelperError::MalformedInput(format!("Missing required column '{}'", name))
            })
        };

        let columns = Self {
            title: require(TITLE_COLUMN)?,
            content: require(CONTENT_COLUMN)?,
            category: require(CATEGORY_COLUMN)?,
            keywords: find(KEYWORDS_COLUMN),
        };
        debug!(
            "Resolved columns: title={}, content={}, category={}, keywords={:?}",
            columns.title, columns.content, columns.category, columns.keywords
        );
        Ok(columns)
    }

    fn parse_row(&self, row: &csv::StringRecord, line: u64, source: &str) -> Result<Record> {
        let title = row.get(self.title).unwrap_or_default().trim();
        if title.is_empty() {
            return Err(HelperError::MalformedInput(format!(
                "Row on line {} has an empty '{}'",
                line, TITLE_COLUMN
            )));
        }

        let category_cell = row.get(self.category).unwrap_or_default();
        if category_cell.trim().is_empty() {
            return Err(HelperError::MalformedInput(format!(
                "Row on line {} has an empty '{}'",
                line, CATEGORY_COLUMN
            )));
        }
        let category = category_cell.parse::<Category>().map_err(|_| {
            HelperError::MalformedInput(format!(
                "Row on line {} has unknown category '{}'",
                line,
                category_cell.trim()
            ))
        })?;

        let keywords = self
            .keywords
            .and_then(|index| row.get(index))
            .map(parse_keywords)
            .unwrap_or_default();

        Ok(Record {
            title: title.to_string(),
            body: row.get(self.content).unwrap_or_default().trim().to_string(),
            category,
            keywords,
            source: source.to_string(),
        })
    }
}
