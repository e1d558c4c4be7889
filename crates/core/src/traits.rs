use crate::{DocumentChunk, RetrievedChunk, SearchError};
use async_trait::async_trait;

/// Nearest-neighbour store over normalized chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stores one record per chunk; `embeddings[i]` belongs to `chunks[i]`.
    async fn add(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>])
        -> Result<(), SearchError>;

    /// Returns at most `k` distinct chunks by descending cosine similarity.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError>;

    async fn clear(&self) -> Result<(), SearchError>;

    async fn len(&self) -> Result<usize, SearchError>;
}

pub(crate) fn check_pairing(
    chunks: &[DocumentChunk],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<(), SearchError> {
    if chunks.len() != embeddings.len() {
        return Err(SearchError::Request(format!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }

    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
        return Err(SearchError::DimensionMismatch {
            expected: dimensions,
            actual: bad.len(),
        });
    }

    Ok(())
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    async fn add(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        (**self).add(chunks, embeddings).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        (**self).query(vector, k).await
    }

    async fn clear(&self) -> Result<(), SearchError> {
        (**self).clear().await
    }

    async fn len(&self) -> Result<usize, SearchError> {
        (**self).len().await
    }
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for std::sync::Arc<T> {
    async fn add(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        (**self).add(chunks, embeddings).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        (**self).query(vector, k).await
    }

    async fn clear(&self) -> Result<(), SearchError> {
        (**self).clear().await
    }

    async fn len(&self) -> Result<usize, SearchError> {
        (**self).len().await
    }
}
