use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported provider: {0} (expected openai, azure or gemini)")]
    UnsupportedProvider(String),

    #[error("missing setting {setting} for provider {provider}")]
    MissingSetting {
        provider: &'static str,
        setting: &'static str,
    },

    #[error("unrecognized scope key: {0}")]
    UnrecognizedScope(String),

    #[error("invalid scope value: {0}")]
    InvalidScope(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("field not found in table schema: {field}")]
    FieldNotFound { field: String },

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("lancedb error: {0}")]
    Lance(lancedb::Error),
}

impl From<lancedb::Error> for BackendError {
    fn from(error: lancedb::Error) -> Self {
        match error {
            lancedb::Error::TableNotFound { name, .. } => BackendError::TableNotFound(name),
            lancedb::Error::TableAlreadyExists { name, .. } => BackendError::TableExists(name),
            other => BackendError::Lance(other),
        }
    }
}

impl BackendError {
    /// Returns true when the backend rejected a filter because `field` is
    /// absent from the table schema.
    pub fn is_missing_field(&self, field: &str) -> bool {
        matches!(self, BackendError::FieldNotFound { field: missing } if missing == field)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {provider}: {details}")]
    Response {
        provider: &'static str,
        details: String,
    },

    #[error("{provider} returned no {what}")]
    EmptyResponse {
        provider: &'static str,
        what: &'static str,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
