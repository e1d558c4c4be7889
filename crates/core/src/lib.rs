pub mod chunking;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rewriter;
pub mod stores;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
mod testing;

pub use chunking::{chunk_pages, clean_page_text, split_windows, ChunkingConfig, TextWindow};
pub use config::{EmbeddingConfig, LlmConfig, PipelineConfig, VectorStoreConfig, DEFAULT_TOP_K};
pub use conversation::{ConversationLog, ConversationStore, SessionGuard};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, EmbeddingError, InferenceError, IngestError, SearchError, TurnError,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PdfExtractor};
pub use ingest::{
    discover_pdf_files, ingest_uploads_best_effort, load_uploads, IngestionReport, SkippedPdf,
};
pub use llm::{ChatMessage, ChatModel, ChatRequest, OpenAiCompatibleChat};
pub use models::{
    DocumentChunk, DocumentFingerprint, IngestionOptions, PageText, RetrievedChunk, Role, Turn,
    TurnOutcome, UploadedPdf,
};
pub use orchestrator::{ConversationalRag, IndexStats, TurnStage};
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use traits::VectorIndex;
