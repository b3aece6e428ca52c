use crate::error::BackendError;
use crate::filter::CORPUS_FIELD;
use crate::models::{IndexedRecord, RecordMetadata, RetrievedChunk};
use crate::traits::{DropOutcome, VectorIndex};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray, StructArray,
};
use arrow_schema::{DataType, Field, Fields, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const VECTOR_COLUMN: &str = "vector";
pub const TEXT_COLUMN: &str = "text";
pub const METADATA_COLUMN: &str = "metadata";
const DISTANCE_COLUMN: &str = "_distance";

/// Deepest parenthesis nesting accepted in a filter expression.
pub const MAX_FILTER_DEPTH: usize = 64;

// `metadata['field']` or `metadata.field`
const FIELD_REF_PATTERN: &str =
    r"metadata\s*(?:\[\s*'([^']*)'\s*\]|\.\s*([A-Za-z_][A-Za-z0-9_]*))";

/// Vector table stored in a LanceDB database. Rows carry the vector, the
/// chunk text and a `metadata` struct column; filters are Lance SQL
/// predicates over that struct.
pub struct LanceVectorStore {
    connection: Connection,
    table_name: String,
    field_refs: Regex,
}

impl LanceVectorStore {
    pub async fn connect(uri: &str, table_name: impl Into<String>) -> Result<Self, BackendError> {
        let connection = lancedb::connect(uri).execute().await?;
        let table_name = table_name.into();
        debug!(uri, table = %table_name, "connected to lancedb");

        Ok(Self {
            connection,
            table_name,
            field_refs: Regex::new(FIELD_REF_PATTERN)?,
        })
    }

    /// Opens (creating if needed) the database directory `dir`.
    pub async fn open(dir: &Path, table_name: impl Into<String>) -> Result<Self, BackendError> {
        tokio::fs::create_dir_all(dir).await?;
        Self::connect(&dir.to_string_lossy(), table_name).await
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub async fn row_count(&self) -> Result<usize, BackendError> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        Ok(self.open_table().await?.count_rows(None).await?)
    }

    async fn open_table(&self) -> Result<Table, BackendError> {
        Ok(self.connection.open_table(&self.table_name).execute().await?)
    }

    /// Trimmed filter, or `None` when blank. Metadata fields the table lacks
    /// are reported as [`BackendError::FieldNotFound`].
    fn checked_filter<'f>(
        &self,
        fields: &BTreeSet<String>,
        filter: Option<&'f str>,
    ) -> Result<Option<&'f str>, BackendError> {
        let Some(filter) = filter.map(str::trim).filter(|filter| !filter.is_empty()) else {
            return Ok(None);
        };
        check_nesting(filter)?;

        for captures in self.field_refs.captures_iter(filter) {
            let Some(name) = captures.get(1).or_else(|| captures.get(2)) else {
                continue;
            };
            if !fields.contains(name.as_str()) {
                return Err(BackendError::FieldNotFound {
                    field: name.as_str().to_string(),
                });
            }
        }
        Ok(Some(filter))
    }
}

#[async_trait]
impl VectorIndex for LanceVectorStore {
    async fn table_exists(&self) -> Result<bool, BackendError> {
        let names = self.connection.table_names().execute().await?;
        Ok(names.contains(&self.table_name))
    }

    async fn create_table(&self, records: Vec<IndexedRecord>) -> Result<(), BackendError> {
        let dimensions = records
            .first()
            .map(|record| record.vector.len())
            .ok_or_else(|| {
                BackendError::SchemaMismatch("cannot infer a schema from an empty batch".to_string())
            })?;
        let with_corpus = records
            .iter()
            .any(|record| record.metadata.corpus_id.is_some());

        let batch = record_batch(&records, dimensions, with_corpus)?;
        let schema = batch.schema();
        self.connection
            .create_table(&self.table_name, RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await?;
        debug!(table = %self.table_name, dimensions, with_corpus, "created lance table");
        Ok(())
    }

    async fn append(&self, records: Vec<IndexedRecord>) -> Result<(), BackendError> {
        let table = self.open_table().await?;
        if records.is_empty() {
            return Ok(());
        }

        let schema = table.schema().await?;
        let dimensions = vector_dimensions(&schema)?;
        let with_corpus = metadata_fields_of(&schema).contains(CORPUS_FIELD);

        let batch = record_batch(&records, dimensions, with_corpus)?;
        let schema = batch.schema();
        table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, BackendError> {
        let table = self.open_table().await?;
        let schema = table.schema().await?;

        let dimensions = vector_dimensions(&schema)?;
        if vector.len() != dimensions {
            return Err(BackendError::SchemaMismatch(format!(
                "query dimension {} != table dimension {dimensions}",
                vector.len()
            )));
        }
        let filter = self.checked_filter(&metadata_fields_of(&schema), filter)?;

        let mut query = table
            .query()
            .nearest_to(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(k);
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await?
            .try_collect()
            .await
            .map_err(|error| BackendError::Query(error.to_string()))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(retrieved_chunks(batch)?);
        }
        Ok(hits)
    }

    async fn list_distinct(
        &self,
        field: &str,
        filter: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        let table = self.open_table().await?;
        let schema = table.schema().await?;
        let fields = metadata_fields_of(&schema);
        if !fields.contains(field) {
            return Err(BackendError::FieldNotFound {
                field: field.to_string(),
            });
        }
        let filter = self.checked_filter(&fields, filter)?;

        let mut query = table
            .query()
            .select(Select::Columns(vec![METADATA_COLUMN.to_string()]));
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await?
            .try_collect()
            .await
            .map_err(|error| BackendError::Query(error.to_string()))?;

        let mut values = BTreeSet::new();
        for batch in &batches {
            let metadata = metadata_column(batch)?;
            for row in 0..batch.num_rows() {
                let value = child_string(metadata, field, row)
                    .or_else(|| child_int(metadata, field, row).map(|number| number.to_string()));
                if let Some(value) = value.filter(|value| !value.is_empty()) {
                    values.insert(value);
                }
            }
        }
        Ok(values)
    }

    async fn drop_table(&self) -> Result<DropOutcome, BackendError> {
        if !self.table_exists().await? {
            return Ok(DropOutcome::AlreadyAbsent);
        }
        match self.connection.drop_table(&self.table_name).await {
            Ok(_) => Ok(DropOutcome::Dropped),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(DropOutcome::AlreadyAbsent),
            Err(error) => Err(error.into()),
        }
    }
}

fn check_nesting(filter: &str) -> Result<(), BackendError> {
    let mut depth = 0usize;
    let mut in_literal = false;
    for c in filter.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => {
                depth += 1;
                if depth > MAX_FILTER_DEPTH {
                    return Err(BackendError::InvalidFilter(format!(
                        "expression nests deeper than {MAX_FILTER_DEPTH} levels"
                    )));
                }
            }
            ')' if !in_literal => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn metadata_fields(with_corpus: bool) -> Fields {
    let mut fields = vec![
        Field::new("source", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("page", DataType::Int64, false),
        Field::new("section", DataType::Utf8, false),
    ];
    if with_corpus {
        fields.push(Field::new(CORPUS_FIELD, DataType::Utf8, true));
    }
    Fields::from(fields)
}

fn vector_item() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, true))
}

fn table_schema(dimensions: usize, with_corpus: bool) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(vector_item(), dimensions as i32),
            false,
        ),
        Field::new(TEXT_COLUMN, DataType::Utf8, false),
        Field::new(
            METADATA_COLUMN,
            DataType::Struct(metadata_fields(with_corpus)),
            false,
        ),
    ]))
}

fn metadata_fields_of(schema: &Schema) -> BTreeSet<String> {
    match schema.field_with_name(METADATA_COLUMN).map(Field::data_type) {
        Ok(DataType::Struct(fields)) => fields.iter().map(|field| field.name().clone()).collect(),
        _ => BTreeSet::new(),
    }
}

fn vector_dimensions(schema: &Schema) -> Result<usize, BackendError> {
    match schema.field_with_name(VECTOR_COLUMN)?.data_type() {
        DataType::FixedSizeList(_, size) => Ok(*size as usize),
        other => Err(BackendError::SchemaMismatch(format!(
            "{VECTOR_COLUMN} column has type {other}"
        ))),
    }
}

fn record_batch(
    records: &[IndexedRecord],
    dimensions: usize,
    with_corpus: bool,
) -> Result<RecordBatch, BackendError> {
    let mut flat: Vec<f32> = Vec::with_capacity(records.len() * dimensions);
    for record in records {
        if record.vector.len() != dimensions {
            return Err(BackendError::SchemaMismatch(format!(
                "vector dimension {} != table dimension {dimensions}",
                record.vector.len()
            )));
        }
        if record.metadata.corpus_id.is_some() && !with_corpus {
            return Err(BackendError::SchemaMismatch(format!(
                "table has no {CORPUS_FIELD} field"
            )));
        }
        flat.extend_from_slice(&record.vector);
    }

    let values: ArrayRef = Arc::new(Float32Array::from(flat));
    let vectors = FixedSizeListArray::try_new(vector_item(), dimensions as i32, values, None)?;
    let texts = StringArray::from_iter_values(records.iter().map(|record| record.content.as_str()));

    let mut children: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|record| record.metadata.source.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|record| record.metadata.file_path.as_str()),
        )),
        Arc::new(Int64Array::from_iter_values(
            records.iter().map(|record| i64::from(record.metadata.page)),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|record| record.metadata.section.as_str()),
        )),
    ];
    if with_corpus {
        children.push(Arc::new(StringArray::from_iter(
            records.iter().map(|record| record.metadata.corpus_id.as_deref()),
        )));
    }
    let metadata = StructArray::try_new(metadata_fields(with_corpus), children, None)?;

    Ok(RecordBatch::try_new(
        table_schema(dimensions, with_corpus),
        vec![Arc::new(vectors), Arc::new(texts), Arc::new(metadata)],
    )?)
}

fn metadata_column(batch: &RecordBatch) -> Result<&StructArray, BackendError> {
    batch
        .column_by_name(METADATA_COLUMN)
        .and_then(|column| column.as_any().downcast_ref::<StructArray>())
        .ok_or_else(|| BackendError::SchemaMismatch(format!("missing {METADATA_COLUMN} struct")))
}

fn child_string(metadata: &StructArray, name: &str, row: usize) -> Option<String> {
    let column = metadata
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<StringArray>()?;
    column.is_valid(row).then(|| column.value(row).to_string())
}

fn child_int(metadata: &StructArray, name: &str, row: usize) -> Option<i64> {
    let column = metadata
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<Int64Array>()?;
    column.is_valid(row).then(|| column.value(row))
}

fn retrieved_chunks(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>, BackendError> {
    let texts = batch
        .column_by_name(TEXT_COLUMN)
        .and_then(|column| column.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| BackendError::SchemaMismatch(format!("missing {TEXT_COLUMN} column")))?;
    let metadata = metadata_column(batch)?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|column| column.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| RetrievedChunk {
            content: texts.value(row).to_string(),
            metadata: RecordMetadata {
                source: child_string(metadata, "source", row).unwrap_or_default(),
                file_path: child_string(metadata, "file_path", row).unwrap_or_default(),
                page: child_int(metadata, "page", row)
                    .and_then(|page| u32::try_from(page).ok())
                    .unwrap_or(0),
                section: child_string(metadata, "section", row).unwrap_or_default(),
                corpus_id: child_string(metadata, CORPUS_FIELD, row),
            },
            // cosine distance to similarity
            score: distances.map_or(0.0, |distances| 1.0 - distances.value(row)),
        })
        .collect())
}
