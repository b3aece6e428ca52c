use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::models::{Chunk, ChunkMetadata, IndexedRecord, RecordMetadata, UNKNOWN_SOURCE};
use crate::traits::VectorIndex;
use tracing::{debug, info};

/// Fills metadata gaps so that no stored field is null: `source` comes from
/// `source` or else `file_path`, reduced to a bare filename, falling back to
/// `"unknown"`; `page` defaults to 0 and `section` to an empty string.
pub fn normalize_metadata(metadata: &ChunkMetadata) -> RecordMetadata {
    let source = [metadata.source.as_deref(), metadata.file_path.as_deref()]
        .into_iter()
        .flatten()
        .map(bare_file_name)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    RecordMetadata {
        source,
        file_path: metadata.file_path.clone().unwrap_or_default(),
        page: metadata.page.unwrap_or(0),
        section: metadata.section.clone().unwrap_or_default(),
        corpus_id: metadata.corpus_id.clone(),
    }
}

fn bare_file_name(path: &str) -> String {
    path.trim()
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Embeds chunks and writes them to the vector table, creating the table
/// from the first batch when it does not exist yet. Re-indexing the same
/// chunks appends duplicates.
pub struct Indexer<'a, V, E> {
    index: &'a V,
    embedder: &'a E,
}

impl<'a, V, E> Indexer<'a, V, E>
where
    V: VectorIndex + Send + Sync,
    E: Embedder + Send + Sync,
{
    pub fn new(index: &'a V, embedder: &'a E) -> Self {
        Self { index, embedder }
    }

    pub async fn index(&self, chunks: &[Chunk]) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            debug!("no chunks to index, leaving the table untouched");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IngestError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(expected) = self.embedder.dimensions() {
            if let Some(vector) = vectors.iter().find(|vector| vector.len() != expected) {
                return Err(IngestError::InvalidArgument(format!(
                    "embedding width {} doesn't match embedder dimensions {expected}",
                    vector.len()
                )));
            }
        }

        let records: Vec<IndexedRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedRecord {
                vector,
                content: chunk.content.clone(),
                metadata: normalize_metadata(&chunk.metadata),
            })
            .collect();
        let count = records.len();

        if self.index.table_exists().await? {
            self.index.append(records).await?;
            debug!(record_count = count, "appended records");
        } else {
            self.index.create_table(records).await?;
            info!(record_count = count, "created vector table");
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::ProviderError;
    use crate::stores::LanceVectorStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn chunk(content: &str, metadata: ChunkMetadata) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata,
        }
    }

    #[test]
    fn source_is_reduced_to_file_name() {
        let metadata = normalize_metadata(&ChunkMetadata {
            source: Some("/srv/uploads/alpha.pdf".to_string()),
            ..ChunkMetadata::default()
        });
        assert_eq!(metadata.source, "alpha.pdf");

        let metadata = normalize_metadata(&ChunkMetadata {
            file_path: Some("C:\\docs\\beta.pdf".to_string()),
            ..ChunkMetadata::default()
        });
        assert_eq!(metadata.source, "beta.pdf");
    }

    #[test]
    fn missing_fields_get_non_null_defaults() {
        let metadata = normalize_metadata(&ChunkMetadata::default());
        assert_eq!(metadata.source, UNKNOWN_SOURCE);
        assert_eq!(metadata.page, 0);
        assert_eq!(metadata.section, "");
        assert_eq!(metadata.corpus_id, None);
    }

    #[tokio::test]
    async fn empty_batch_does_not_create_a_table() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LanceVectorStore::open(dir.path(), "t").await?;
        let embedder = CharacterNgramEmbedder::default();

        let indexed = Indexer::new(&store, &embedder).index(&[]).await?;

        assert_eq!(indexed, 0);
        assert!(!store.table_exists().await?);
        Ok(())
    }

    #[tokio::test]
    async fn reindexing_appends_duplicates() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LanceVectorStore::open(dir.path(), "t").await?;
        let embedder = CharacterNgramEmbedder::default();
        let indexer = Indexer::new(&store, &embedder);
        let chunks = vec![
            chunk("first", ChunkMetadata::default()),
            chunk("second", ChunkMetadata::default()),
        ];

        assert_eq!(indexer.index(&chunks).await?, 2);
        assert_eq!(indexer.index(&chunks).await?, 2);
        assert_eq!(store.row_count().await?, 4);
        Ok(())
    }

    /// Claims one width and returns vectors of another.
    struct MisreportingEmbedder;

    #[async_trait]
    impl Embedder for MisreportingEmbedder {
        fn dimensions(&self) -> Option<usize> {
            Some(8)
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![1.0; 4])
        }
    }

    #[tokio::test]
    async fn vectors_of_the_wrong_width_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LanceVectorStore::open(dir.path(), "t").await?;

        let result = Indexer::new(&store, &MisreportingEmbedder)
            .index(&[chunk("first", ChunkMetadata::default())])
            .await;

        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        assert!(!store.table_exists().await?);
        Ok(())
    }
}
