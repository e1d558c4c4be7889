use crate::orchestrator::TurnStage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to extract {source_name}: {reason}")]
    Extraction { source_name: String, reason: String },

    #[error("no valid documents could be processed")]
    NoDocuments,

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("indexing failed: {0}")]
    Indexing(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

/// Failures of the hosted chat model. Upstream messages are kept verbatim.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{provider} returned {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} response had no message content")]
    EmptyResponse { provider: String },
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("session id must not be empty")]
    InvalidSession,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("no documents have been indexed; upload PDF documents first")]
    NoDocuments,

    #[error("{source}")]
    Inference {
        stage: TurnStage,
        #[source]
        source: InferenceError,
    },

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] SearchError),
}

impl TurnError {
    /// Stage the turn was in when it aborted, if it got past validation.
    pub fn stage(&self) -> Option<TurnStage> {
        match self {
            TurnError::Inference { stage, .. } => Some(*stage),
            TurnError::Embedding(_) | TurnError::Retrieval(_) => Some(TurnStage::Retrieving),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}
