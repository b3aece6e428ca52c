pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod retriever;
pub mod session;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{chunk_documents, ChunkingConfig, RecursiveSplitter, SectionHeuristic};
pub use config::Settings;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{BackendError, ConfigError, IngestError, ProviderError, SearchError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use filter::{build_filter, ScopeRequest};
pub use indexer::{normalize_metadata, Indexer};
pub use ingest::{discover_pdf_files, load_pdfs, save_upload, LoadReport, SkippedFile, UploadedFile};
pub use models::{
    ChatMessage, ChatRole, Chunk, ChunkMetadata, CorpusId, Document, IndexedRecord,
    RecordMetadata, RetrievedChunk,
};
pub use orchestrator::{list_sources, reset_store, Answer, AskRequest, IngestionReport, RagCoordinator};
pub use providers::{ChatModel, ProviderClient, ProviderKind};
pub use retriever::{format_context, Retriever};
pub use session::{InMemorySessionStore, SessionStore, DEFAULT_SESSION_ID};
pub use stores::LanceVectorStore;
pub use traits::{DropOutcome, VectorIndex};
