use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_TOP_K: usize = 6;
pub const DEFAULT_CHUNK_SIZE: usize = 1_200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TABLE: &str = "pdf_rag";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-large".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AzureSettings {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub chat_deployment: Option<String>,
    pub embed_deployment: Option<String>,
    pub api_version: String,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            chat_deployment: None,
            embed_deployment: None,
            api_version: "2024-06-01".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            chat_model: "gemini-2.5-pro".to_string(),
            embed_model: "text-embedding-004".to_string(),
        }
    }
}

/// Every option the service recognizes. The binary fills this from flags and
/// environment variables; library callers may build it directly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: String,
    pub openai: OpenAiSettings,
    pub azure: AzureSettings,
    pub gemini: GeminiSettings,
    pub temperature: f32,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub upload_dir: PathBuf,
    pub store_dir: PathBuf,
    pub table: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            openai: OpenAiSettings::default(),
            azure: AzureSettings::default(),
            gemini: GeminiSettings::default(),
            temperature: 0.1,
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            upload_dir: PathBuf::from("./data/uploads"),
            store_dir: PathBuf::from("./.data/lancedb"),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be positive".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table name is empty".to_string()));
        }
        Ok(())
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.store_dir)
    }
}
