// LanceDB persistence for the similarity index
// The index is written as a single `records` table and read back whole


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{EmbeddedRecord, SimilarityIndex};
use crate::loader::{Category, Record, parse_keywords};
use crate::{HelperError, Result};

pub const TABLE_NAME: &str = "records";

async fn connect(path: &Path) -> Result<Connection> {
    let uri = format!("file://{}", path.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to connect to LanceDB: {}", e)))
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
    let vector_dim = i32::try_from(vector_dim).map_err(|_| {
        HelperError::Database(format!("Vector dimension {} is too large", vector_dim))
    })?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("source_index", DataType::UInt32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim,
            ),
            false,
        ),
        Field::new("title", DataType::Utf8, false),
        Field::new("body", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("keywords", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

/// Replace whatever is stored at `path` with `index`
pub(super) async fn write_index(path: &Path, index: &SimilarityIndex) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        HelperError::Database(format!("Failed to create vector database directory: {}", e))
    })?;

    let connection = connect(path).await?;
    drop_table_if_exists(&connection).await?;

    let schema = create_schema(index.dimension())?;
    let record_batch = create_record_batch(Arc::clone(&schema), index)?;

    connection
        .create_empty_table(TABLE_NAME, Arc::clone(&schema))
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to create table: {}", e)))?;

    let table = connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to open table: {}", e)))?;

    let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
    table
        .add(reader)
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to insert records: {}", e)))?;

    info!(
        "Stored {} embedded records in {}",
        index.len(),
        path.display()
    );
    Ok(())
}

/// Read every stored record back
///
/// A missing directory or table is reported as [`HelperError::IndexNotFound`].
pub(super) async fn read_entries(path: &Path) -> Result<Vec<EmbeddedRecord>> {
    if !path.exists() {
        return Err(HelperError::IndexNotFound(path.display().to_string()));
    }

    let connection = connect(path).await?;
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to list tables: {}", e)))?;

    if !table_names.iter().any(|name| name == TABLE_NAME) {
        return Err(HelperError::IndexNotFound(path.display().to_string()));
    }

    let table = connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to open table: {}", e)))?;

    let row_count = table
        .count_rows(None)
        .await
        .map_err(|e| HelperError::Database(format!("Failed to count rows: {}", e)))?;

    if row_count == 0 {
        return Err(HelperError::IndexNotFound(path.display().to_string()));
    }

    let mut results = table
        .query()
        .limit(row_count)
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to read records: {}", e)))?;

    let mut entries = Vec::with_capacity(row_count);
    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to read result stream: {}", e)))?
    {
        entries.extend(parse_batch(&batch)?);
    }

    debug!(
        "Read {} embedded records from {}",
        entries.len(),
        path.display()
    );
    Ok(entries)
}

async fn drop_table_if_exists(connection: &Connection) -> Result<()> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| HelperError::Database(format!("Failed to list tables for drop: {}", e)))?;

    if table_names.iter().any(|name| name == TABLE_NAME) {
        info!("Dropping existing records table");
        connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| HelperError::Database(format!("Failed to drop table: {}", e)))?;
    }

    Ok(())
}

fn create_record_batch(schema: Arc<Schema>, index: &SimilarityIndex) -> Result<RecordBatch> {
    let len = index.len();
    let vector_dim = index.dimension();
    let created_at = chrono::Utc::now().to_rfc3339();

    let mut source_indices = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut titles = Vec::with_capacity(len);
    let mut bodies = Vec::with_capacity(len);
    let mut categories = Vec::with_capacity(len);
    let mut keywords = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);

    for entry in index.entries() {
        let source_index = u32::try_from(entry.source_index).map_err(|_| {
            HelperError::Database(format!("Source index {} is too large", entry.source_index))
        })?;
        source_indices.push(source_index);
        flat_values.extend_from_slice(&entry.vector);
        titles.push(entry.record.title.as_str());
        bodies.push(entry.record.body.as_str());
        categories.push(entry.record.category.as_str());
        keywords.push(entry.record.keywords.join(","));
        sources.push(entry.record.source.as_str());
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let dim = i32::try_from(vector_dim).map_err(|_| {
        HelperError::Database(format!("Vector dimension {} is too large", vector_dim))
    })?;
    let vector_array = FixedSizeListArray::try_new(field, dim, Arc::new(values_array), None)
        .map_err(|e| HelperError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(UInt32Array::from(source_indices)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(titles)),
        Arc::new(StringArray::from(bodies)),
        Arc::new(StringArray::from(categories)),
        Arc::new(StringArray::from(keywords)),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(vec![created_at.as_str(); len])),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| HelperError::Database(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| HelperError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| HelperError::Database(format!("Invalid {} column type", name)))
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<EmbeddedRecord>> {
    let source_indices = batch
        .column_by_name("source_index")
        .ok_or_else(|| HelperError::Database("Missing source_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| HelperError::Database("Invalid source_index column type".to_string()))?;

    let vectors = batch
        .column_by_name("vector")
        .ok_or_else(|| HelperError::Database("Missing vector column".to_string()))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| HelperError::Database("Invalid vector column type".to_string()))?;

    let titles = string_column(batch, "title")?;
    let bodies = string_column(batch, "body")?;
    let categories = string_column(batch, "category")?;
    let keywords = string_column(batch, "keywords")?;
    let sources = string_column(batch, "source")?;

    let mut entries = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let vector_values = vectors.value(row);
        let vector = vector_values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| HelperError::Database("Invalid vector item type".to_string()))?
            .values()
            .to_vec();

        let category: Category = categories.value(row).parse().map_err(|_| {
            HelperError::Database(format!(
                "Stored record has unknown category '{}'",
                categories.value(row)
            ))
        })?;

        entries.push(EmbeddedRecord {
            record: Record {
                title: titles.value(row).to_string(),
                body: bodies.value(row).to_string(),
                category,
                keywords: parse_keywords(keywords.value(row)),
                source: sources.value(row).to_string(),
            },
            vector,
            source_index: source_indices.value(row) as usize,
        });
    }

    Ok(entries)
}
