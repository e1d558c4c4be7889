use crate::chunking::ChunkingConfig;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::error::ConfigError;
use crate::llm::{DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE};
use crate::models::IngestionOptions;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingConfig {
    /// Offline trigram hashing; no network, lower recall.
    CharacterNgram { dimensions: usize },
    Http {
        base_url: String,
        model: String,
        api_key: Option<String>,
        dimensions: usize,
        timeout: Duration,
    },
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::CharacterNgram {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl EmbeddingConfig {
    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingConfig::CharacterNgram { dimensions }
            | EmbeddingConfig::Http { dimensions, .. } => *dimensions,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VectorStoreConfig {
    #[default]
    InMemory,
    Qdrant {
        url: String,
        collection: String,
        timeout: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ingestion: IngestionOptions,
    pub top_k: usize,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingestion: IngestionOptions::default(),
            top_k: DEFAULT_TOP_K,
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks everything a turn will need, before any pipeline step runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_key = self
            .llm
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !has_key {
            return Err(ConfigError::MissingCredential(
                "an LLM API key is required (set GROQ_API_KEY or pass --api-key)".to_string(),
            ));
        }

        self.validate_backends()
    }

    /// Everything `validate` checks except the chat credential. Enough for
    /// ingestion, which never calls the chat model.
    pub fn validate_backends(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(invalid("top_k", "must be at least 1"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid("temperature", "must be between 0.0 and 2.0"));
        }

        ChunkingConfig::from(&self.ingestion)
            .validate()
            .map_err(|error| invalid("chunking", &error.to_string()))?;

        Url::parse(&self.llm.base_url)?;

        if self.embedding.dimensions() == 0 {
            return Err(invalid("embedding.dimensions", "must be at least 1"));
        }
        if let EmbeddingConfig::Http { base_url, model, .. } = &self.embedding {
            Url::parse(base_url)?;
            if model.trim().is_empty() {
                return Err(invalid("embedding.model", "must not be empty"));
            }
        }

        if let VectorStoreConfig::Qdrant { url, collection, .. } = &self.vector_store {
            Url::parse(url)?;
            if collection.trim().is_empty() {
                return Err(invalid("qdrant.collection", "must not be empty"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
