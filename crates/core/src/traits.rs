use crate::error::BackendError;
use crate::models::{IndexedRecord, RetrievedChunk};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    AlreadyAbsent,
}

/// The vector table the pipeline writes to and queries. Filters use the
/// expression syntax produced by [`crate::filter::build_filter`].
#[async_trait]
pub trait VectorIndex {
    async fn table_exists(&self) -> Result<bool, BackendError>;

    /// Creates the table with a schema inferred from `records`. Fails with
    /// [`BackendError::TableExists`] if another writer created it first.
    async fn create_table(&self, records: Vec<IndexedRecord>) -> Result<(), BackendError>;

    /// Appends rows to an existing table; existing rows are left untouched.
    async fn append(&self, records: Vec<IndexedRecord>) -> Result<(), BackendError>;

    /// Up to `k` records ranked best match first.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, BackendError>;

    async fn list_distinct(
        &self,
        field: &str,
        filter: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError>;

    async fn drop_table(&self) -> Result<DropOutcome, BackendError>;
}
