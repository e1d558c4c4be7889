use crate::config::DEFAULT_TOP_K;
use crate::conversation::{ConversationLog, ConversationStore};
use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError, TurnError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::{ingest_uploads_best_effort, IngestionReport};
use crate::llm::ChatModel;
use crate::models::{IngestionOptions, RetrievedChunk, TurnOutcome, UploadedPdf};
use crate::rewriter::rewrite;
use crate::synthesizer::synthesize;
use crate::traits::VectorIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStage {
    Idle,
    Rewriting,
    Retrieving,
    Synthesizing,
    Committed,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Idle => "idle",
            TurnStage::Rewriting => "rewriting",
            TurnStage::Retrieving => "retrieving",
            TurnStage::Synthesizing => "synthesizing",
            TurnStage::Committed => "committed",
        }
    }
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_model: String,
    pub batch_id: Option<Uuid>,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl IndexStats {
    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }
}

pub struct ConversationalRag<E, V, M>
where
    E: Embedder,
    V: VectorIndex,
    M: ChatModel,
{
    embedder: E,
    index: V,
    model: M,
    memory: Arc<ConversationStore>,
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    options: IngestionOptions,
    top_k: usize,
    // Ingestion writes under this gate; retrieval reads under it.
    gate: RwLock<IndexStats>,
}

impl<E, V, M> ConversationalRag<E, V, M>
where
    E: Embedder,
    V: VectorIndex,
    M: ChatModel,
{
    pub fn new(embedder: E, index: V, model: M) -> Self {
        Self {
            embedder,
            index,
            model,
            memory: Arc::new(ConversationStore::new()),
            extractor: Box::new(LopdfExtractor),
            options: IngestionOptions::default(),
            top_k: DEFAULT_TOP_K,
            gate: RwLock::new(IndexStats::default()),
        }
    }

    /// Shares one conversation store between several pipelines.
    pub fn with_memory(mut self, memory: Arc<ConversationStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + Send + Sync + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_ingestion_options(mut self, options: IngestionOptions) -> Self {
        self.options = options;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Replaces the index contents with `uploads`. Unreadable files are
    /// skipped; a rejected write leaves the index empty.
    pub async fn ingest(&self, uploads: &[UploadedPdf]) -> Result<IngestionReport, IngestError> {
        let batch_id = Uuid::new_v4();
        let report = ingest_uploads_best_effort(uploads, self.extractor.as_ref(), &self.options)?;

        let texts: Vec<&str> = report.chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut stats = self.gate.write().await;
        if let Err(error) = self.replace_contents(&report, &embeddings).await {
            *stats = IndexStats::default();
            if let Err(cleanup) = self.index.clear().await {
                warn!(%batch_id, error = %cleanup, "could not clear index after failed write");
            }
            return Err(IngestError::Indexing(error));
        }

        *stats = IndexStats {
            documents: report.documents.len(),
            chunks: report.chunks.len(),
            embedding_model: self.embedder.model_id().to_string(),
            batch_id: Some(batch_id),
            indexed_at: Some(Utc::now()),
        };
        info!(
            %batch_id,
            documents = stats.documents,
            chunks = stats.chunks,
            skipped = report.skipped_files.len(),
            model = %stats.embedding_model,
            "indexed upload batch"
        );

        Ok(report)
    }

    async fn replace_contents(
        &self,
        report: &IngestionReport,
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        self.index.clear().await?;
        self.index.add(&report.chunks, embeddings).await
    }

    pub async fn clear_index(&self) -> Result<(), SearchError> {
        let mut stats = self.gate.write().await;
        self.index.clear().await?;
        *stats = IndexStats::default();
        info!("cleared index");
        Ok(())
    }

    pub async fn index_stats(&self) -> IndexStats {
        self.gate.read().await.clone()
    }

    /// Adopts whatever an external index already holds, e.g. a Qdrant
    /// collection filled by an earlier run. The document count is unknown.
    pub async fn attach_index(&self) -> Result<IndexStats, SearchError> {
        let mut stats = self.gate.write().await;
        let chunks = self.index.len().await?;
        *stats = IndexStats {
            documents: 0,
            chunks,
            embedding_model: self.embedder.model_id().to_string(),
            batch_id: None,
            indexed_at: None,
        };
        info!(chunks, "attached existing index");
        Ok(stats.clone())
    }

    /// Top `k` chunks for `query`, best first. An empty index yields no chunks.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, TurnError> {
        if k == 0 {
            return Err(TurnError::Retrieval(SearchError::Request(
                "k must be at least 1".to_string(),
            )));
        }

        let _gate = self.gate.read().await;
        let vector = self.embedder.embed(query).await?;
        Ok(self.index.query(&vector, k).await?)
    }

    /// On success the question, as given, and the answer are appended to the
    /// session log. On any failure the log is unchanged.
    pub async fn submit_turn(
        &self,
        session_id: &str,
        question: &str,
    ) -> Result<TurnOutcome, TurnError> {
        if session_id.trim().is_empty() {
            return Err(TurnError::InvalidSession);
        }
        if question.trim().is_empty() {
            return Err(TurnError::EmptyQuestion);
        }
        if self.gate.read().await.is_empty() {
            return Err(TurnError::NoDocuments);
        }

        let mut session = self.memory.lock(session_id).await;
        let history = session.snapshot();

        enter(session_id, TurnStage::Rewriting);
        let standalone = rewrite(&self.model, &history, question)
            .await
            .map_err(|source| TurnError::Inference {
                stage: TurnStage::Rewriting,
                source,
            })?;

        enter(session_id, TurnStage::Retrieving);
        let sources = self.retrieve(&standalone, self.top_k).await?;
        // The index may have been cleared since the check above.
        if sources.is_empty() {
            return Err(TurnError::NoDocuments);
        }

        enter(session_id, TurnStage::Synthesizing);
        let answer = synthesize(&self.model, &standalone, &sources, &history)
            .await
            .map_err(|source| TurnError::Inference {
                stage: TurnStage::Synthesizing,
                source,
            })?;

        session.append_exchange(question, answer.clone());
        enter(session_id, TurnStage::Committed);
        info!(
            session = session_id,
            turns = session.log().len(),
            sources = sources.len(),
            "turn committed"
        );

        Ok(TurnOutcome {
            answer,
            standalone_question: standalone,
            sources,
        })
    }

    /// Clears the session's memory. Resetting an unknown session is a no-op.
    pub async fn reset_session(&self, session_id: &str) -> bool {
        let existed = self.memory.reset(session_id).await;
        info!(session = session_id, existed, "session reset");
        existed
    }

    pub async fn history(&self, session_id: &str) -> ConversationLog {
        self.memory.history(session_id).await.unwrap_or_default()
    }
}

fn enter(session_id: &str, stage: TurnStage) {
    debug!(session = session_id, stage = %stage, "turn stage");
}
