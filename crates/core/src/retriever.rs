use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::filter::{build_filter, ScopeRequest, CORPUS_FIELD};
use crate::models::{RetrievedChunk, UNKNOWN_SECTION, UNKNOWN_SOURCE};
use crate::traits::VectorIndex;
use tracing::{debug, warn};

pub struct Retriever<'a, V, E> {
    index: &'a V,
    embedder: &'a E,
    default_top_k: usize,
}

impl<'a, V, E> Retriever<'a, V, E>
where
    V: VectorIndex + Send + Sync,
    E: Embedder + Send + Sync,
{
    pub fn new(index: &'a V, embedder: &'a E, default_top_k: usize) -> Self {
        Self {
            index,
            embedder,
            default_top_k,
        }
    }

    /// Similarity search restricted by `scope` and `corpus_id`, best match
    /// first. A table without a corpus field yields no results instead of
    /// unscoped ones.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: &ScopeRequest,
        k: Option<usize>,
        corpus_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let top_k = k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Err(SearchError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }

        let filter = build_filter(scope, corpus_id);
        debug!(filter = ?filter, top_k, "running similarity query");

        let vector = self.embedder.embed(query).await?;
        match self.index.query(&vector, top_k, filter.as_deref()).await {
            Ok(hits) => Ok(hits),
            Err(error) if error.is_missing_field(CORPUS_FIELD) => {
                warn!(%error, "table predates corpus scoping, returning no results");
                Ok(Vec::new())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Renders hits as `[source | p.page | section]` headed blocks separated by
/// horizontal rules.
pub fn format_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| {
            let source = non_empty_or(&hit.metadata.source, UNKNOWN_SOURCE);
            let section = non_empty_or(&hit.metadata.section, UNKNOWN_SECTION);
            format!(
                "[{} | p.{} | {}]\n{}",
                source, hit.metadata.page, section, hit.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn non_empty_or<'s>(value: &'s str, fallback: &'s str) -> &'s str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::BackendError;
    use crate::models::{IndexedRecord, RecordMetadata};
    use crate::stores::LanceVectorStore;
    use crate::traits::DropOutcome;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts queries and answers them with nothing, or fails every query
    /// when told to.
    #[derive(Default)]
    struct ScriptedIndex {
        queries: AtomicUsize,
        fail_with_missing: Option<&'static str>,
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn table_exists(&self) -> Result<bool, BackendError> {
            Ok(true)
        }

        async fn create_table(&self, _records: Vec<IndexedRecord>) -> Result<(), BackendError> {
            Ok(())
        }

        async fn append(&self, _records: Vec<IndexedRecord>) -> Result<(), BackendError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _k: usize,
            _filter: Option<&str>,
        ) -> Result<Vec<RetrievedChunk>, BackendError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            match self.fail_with_missing {
                Some(field) => Err(BackendError::FieldNotFound {
                    field: field.to_string(),
                }),
                None => Ok(Vec::new()),
            }
        }

        async fn list_distinct(
            &self,
            _field: &str,
            _filter: Option<&str>,
        ) -> Result<BTreeSet<String>, BackendError> {
            Ok(BTreeSet::new())
        }

        async fn drop_table(&self) -> Result<DropOutcome, BackendError> {
            Ok(DropOutcome::AlreadyAbsent)
        }
    }

    fn hit(source: &str, page: u32, section: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            metadata: RecordMetadata {
                source: source.to_string(),
                file_path: String::new(),
                page,
                section: section.to_string(),
                corpus_id: None,
            },
            score: 1.0,
        }
    }

    #[tokio::test]
    async fn blank_query_skips_the_backend() -> Result<(), SearchError> {
        let index = ScriptedIndex::default();
        let embedder = CharacterNgramEmbedder::default();
        let retriever = Retriever::new(&index, &embedder, 6);

        assert!(retriever
            .retrieve("   \n", &ScopeRequest::All, None, None)
            .await?
            .is_empty());
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn zero_k_is_invalid() {
        let index = ScriptedIndex::default();
        let embedder = CharacterNgramEmbedder::default();
        let retriever = Retriever::new(&index, &embedder, 6);

        let result = retriever
            .retrieve("pumps", &ScopeRequest::All, Some(0), None)
            .await;
        assert!(matches!(result, Err(SearchError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn missing_corpus_field_degrades_to_empty() -> Result<(), SearchError> {
        let mut index = ScriptedIndex::default();
        index.fail_with_missing = Some(CORPUS_FIELD);
        let embedder = CharacterNgramEmbedder::default();
        let retriever = Retriever::new(&index, &embedder, 6);

        let hits = retriever
            .retrieve("pumps", &ScopeRequest::All, None, Some("c1"))
            .await?;
        assert!(hits.is_empty());
        assert_eq!(index.queries.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn other_backend_errors_propagate() -> Result<(), Box<dyn std::error::Error>> {
        let mut index = ScriptedIndex::default();
        index.fail_with_missing = Some("page");
        let embedder = CharacterNgramEmbedder::default();
        let retriever = Retriever::new(&index, &embedder, 6);

        let result = retriever
            .retrieve("pumps", &ScopeRequest::raw("metadata['page'] = 1"), None, None)
            .await;
        assert!(matches!(
            result,
            Err(SearchError::Backend(BackendError::FieldNotFound { .. }))
        ));

        let dir = tempfile::tempdir()?;
        let store = LanceVectorStore::open(dir.path(), "t").await?;
        let missing_table = Retriever::new(&store, &embedder, 6)
            .retrieve("pumps", &ScopeRequest::All, None, None)
            .await;
        assert!(matches!(
            missing_table,
            Err(SearchError::Backend(BackendError::TableNotFound(_)))
        ));
        Ok(())
    }

    #[test]
    fn context_blocks_render_placeholders() {
        let context = format_context(&[
            hit("alpha.pdf", 2, "1. Scope", "Pumps shall be inspected."),
            hit("", 0, "", "Orphan text."),
        ]);
        assert_eq!(
            context,
            "[alpha.pdf | p.2 | 1. Scope]\nPumps shall be inspected.\n\n---\n\n\
             [unknown | p.0 | Unknown]\nOrphan text."
        );
    }

    #[test]
    fn empty_context_is_empty() {
        assert_eq!(format_context(&[]), "");
    }
}
