use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Section label used when the heading heuristic finds nothing.
pub const UNKNOWN_SECTION: &str = "Unknown";

/// Source label used when a chunk carries neither `source` nor `path`.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// One extracted page of an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub source: String,
    pub file_path: String,
    pub page: u32,
}

/// Metadata carried by a chunk between chunking and indexing. Every field is
/// optional because chunks may also be assembled by callers other than the
/// chunker; the indexer fills the gaps before writing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: Option<String>,
    pub file_path: Option<String>,
    pub page: Option<u32>,
    pub section: Option<String>,
    pub corpus_id: Option<String>,
}

impl From<&Document> for ChunkMetadata {
    fn from(document: &Document) -> Self {
        Self {
            source: Some(document.source.clone()),
            file_path: Some(document.file_path.clone()),
            page: Some(document.page),
            section: None,
            corpus_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Metadata as persisted in the vector table. No field is nullable except
/// `corpus_id`, which is absent for chunks indexed outside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: RecordMetadata,
}

/// A record returned by a similarity query, best match first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: RecordMetadata,
    pub score: f32,
}

/// Identifier of one indexing operation. Queries carrying it only see the
/// chunks written by that operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusId(String);

impl CorpusId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorpusId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorpusId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorpusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_corpus_ids_are_distinct_hex() {
        let first = CorpusId::generate();
        let second = CorpusId::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn record_metadata_omits_absent_corpus() -> Result<(), serde_json::Error> {
        let metadata = RecordMetadata {
            source: "a.pdf".to_string(),
            file_path: String::new(),
            page: 0,
            section: String::new(),
            corpus_id: None,
        };
        let value = serde_json::to_value(&metadata)?;
        assert!(value.get("corpus_id").is_none());
        Ok(())
    }
}
