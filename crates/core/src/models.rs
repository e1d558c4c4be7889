use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_title: String,
    pub source: String,
    pub checksum: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// One extracted page of a document, the unit handed to the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub source: String,
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source: String,
    pub page: u32,
    /// Position of this chunk among the chunks of its page.
    pub chunk_index: u32,
    /// Position of this chunk across the whole ingestion batch.
    pub ordinal: u64,
    /// Character span `[start, end)` within the page text.
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub ordinal: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub rank: usize,
    pub score: f32,
    pub chunk: DocumentChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub standalone_question: String,
    pub sources: Vec<RetrievedChunk>,
}

/// A PDF handed to ingestion: its display name and raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedPdf {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedPdf {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 5_000,
            chunk_overlap_chars: 500,
        }
    }
}
