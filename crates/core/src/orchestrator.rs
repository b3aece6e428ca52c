use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::config::Settings;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, IngestError, SearchError};
use crate::filter::{with_corpus, ScopeRequest, CORPUS_FIELD, SOURCE_FIELD};
use crate::indexer::Indexer;
use crate::ingest::{load_pdfs, save_upload, SkippedFile};
use crate::models::{ChatMessage, CorpusId, Document, RetrievedChunk};
use crate::prompts::{answer_messages, summary_messages};
use crate::providers::ChatModel;
use crate::retriever::{format_context, Retriever};
use crate::session::{SessionStore, DEFAULT_SESSION_ID};
use crate::traits::{DropOutcome, VectorIndex};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Reported when an upload succeeds but yields no text to index.
pub const NO_TEXT_WARNING: &str = "No text extracted from PDFs";

#[derive(Debug)]
pub struct IngestionReport {
    pub indexed: usize,
    pub corpus_id: Option<CorpusId>,
    pub sources: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub warning: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub question: String,
    pub scope: ScopeRequest,
    pub session_id: Option<String>,
    pub corpus_id: Option<String>,
    pub k: Option<usize>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Wires the write path (load, chunk, tag, index) and the read path
/// (filter, retrieve, prompt, answer) over one vector table.
pub struct RagCoordinator<V, E, C, S> {
    index: V,
    embedder: E,
    chat: C,
    sessions: S,
    chunking: ChunkingConfig,
    top_k: usize,
    upload_dir: PathBuf,
}

impl<V, E, C, S> RagCoordinator<V, E, C, S>
where
    V: VectorIndex + Send + Sync,
    E: Embedder + Send + Sync,
    C: ChatModel + Send + Sync,
    S: SessionStore + Send + Sync,
{
    pub fn new(
        index: V,
        embedder: E,
        chat: C,
        sessions: S,
        settings: &Settings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            index,
            embedder,
            chat,
            sessions,
            chunking: ChunkingConfig {
                chunk_size: settings.chunk_size,
                chunk_overlap: settings.chunk_overlap,
            },
            top_k: settings.top_k,
            upload_dir: settings.upload_dir.clone(),
        })
    }

    pub fn vector_index(&self) -> &V {
        &self.index
    }

    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    fn retriever(&self) -> Retriever<'_, V, E> {
        Retriever::new(&self.index, &self.embedder, self.top_k)
    }

    /// Stores each `(filename, bytes)` payload in the upload directory, then
    /// ingests the stored files as one corpus.
    pub async fn ingest_uploads(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<IngestionReport, IngestError> {
        let mut paths = Vec::with_capacity(files.len());
        for (filename, bytes) in files {
            let uploaded = save_upload(&self.upload_dir, &filename, &bytes)?;
            info!(path = %uploaded.path.display(), checksum = %uploaded.checksum, "stored upload");
            paths.push(uploaded.path);
        }
        self.ingest_paths(&paths).await
    }

    pub async fn ingest_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<IngestionReport, IngestError> {
        let loaded = load_pdfs(paths);
        let mut report = self.ingest_documents(&loaded.documents).await?;
        report.skipped = loaded.skipped;
        Ok(report)
    }

    /// Chunks the pages, tags every chunk with a fresh corpus id and indexes
    /// them. Zero chunks is reported as a warning, not an error, and leaves
    /// the table untouched.
    pub async fn ingest_documents(
        &self,
        documents: &[Document],
    ) -> Result<IngestionReport, IngestError> {
        let mut chunks = chunk_documents(documents, self.chunking)?;

        if chunks.is_empty() {
            warn!(page_count = documents.len(), "{NO_TEXT_WARNING}");
            return Ok(IngestionReport {
                indexed: 0,
                corpus_id: None,
                sources: Vec::new(),
                skipped: Vec::new(),
                warning: Some(NO_TEXT_WARNING.to_string()),
                completed_at: Utc::now(),
            });
        }

        let corpus_id = CorpusId::generate();
        let mut sources: Vec<String> = Vec::new();
        for chunk in &mut chunks {
            chunk.metadata.corpus_id = Some(corpus_id.to_string());
            if let Some(source) = &chunk.metadata.source {
                if !sources.contains(source) {
                    sources.push(source.clone());
                }
            }
        }

        let indexed = Indexer::new(&self.index, &self.embedder)
            .index(&chunks)
            .await?;
        info!(corpus_id = %corpus_id, chunk_count = indexed, "indexed corpus");

        Ok(IngestionReport {
            indexed,
            corpus_id: Some(corpus_id),
            sources,
            skipped: Vec::new(),
            warning: None,
            completed_at: Utc::now(),
        })
    }

    pub async fn retrieve(
        &self,
        query: &str,
        scope: &ScopeRequest,
        k: Option<usize>,
        corpus_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.retriever().retrieve(query, scope, k, corpus_id).await
    }

    /// Answers from retrieved context, then records the user/assistant pair
    /// in the session history.
    pub async fn ask(&self, request: &AskRequest) -> Result<Answer, SearchError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(SearchError::InvalidArgument("question is empty".to_string()));
        }
        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_SESSION_ID);

        let hits = self
            .retrieve(question, &request.scope, request.k, request.corpus_id.as_deref())
            .await?;
        let context = format_context(&hits);
        let history = self.sessions.history(session_id).await;

        let text = self
            .chat
            .complete(&answer_messages(&history, question, &context))
            .await?;

        self.sessions
            .append(
                session_id,
                vec![ChatMessage::user(question), ChatMessage::assistant(text.clone())],
            )
            .await;

        Ok(Answer {
            text,
            sources: hits,
        })
    }

    pub async fn summarize(
        &self,
        query: &str,
        corpus_id: Option<&str>,
    ) -> Result<Answer, SearchError> {
        let hits = self
            .retrieve(query, &ScopeRequest::All, None, corpus_id)
            .await?;
        let text = self
            .chat
            .complete(&summary_messages(&format_context(&hits)))
            .await?;
        Ok(Answer {
            text,
            sources: hits,
        })
    }

    pub async fn list_sources(&self, corpus_id: Option<&str>) -> Result<Vec<String>, SearchError> {
        list_sources(&self.index, corpus_id).await
    }

    pub async fn reset_store(&self) -> Result<DropOutcome, SearchError> {
        reset_store(&self.index).await
    }
}

/// Sorted distinct source filenames, optionally limited to one corpus. A
/// missing table, or one that predates corpus tagging, lists nothing.
pub async fn list_sources<V>(index: &V, corpus_id: Option<&str>) -> Result<Vec<String>, SearchError>
where
    V: VectorIndex + Send + Sync,
{
    if !index.table_exists().await? {
        return Ok(Vec::new());
    }

    let filter = with_corpus(None, corpus_id);
    match index.list_distinct(SOURCE_FIELD, filter.as_deref()).await {
        Ok(sources) => Ok(sources.into_iter().collect()),
        Err(error) if error.is_missing_field(CORPUS_FIELD) => Ok(Vec::new()),
        Err(error) => Err(error.into()),
    }
}

pub async fn reset_store<V>(index: &V) -> Result<DropOutcome, SearchError>
where
    V: VectorIndex + Send + Sync,
{
    let outcome = index.drop_table().await?;
    info!(outcome = ?outcome, "reset vector table");
    Ok(outcome)
}
