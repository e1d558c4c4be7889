use crate::traits::{check_pairing, VectorIndex};
use crate::{DocumentChunk, RetrievedChunk, SearchError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
struct Record {
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

/// Brute-force cosine index held in process memory.
///
/// `add` publishes a new snapshot in one swap, so a concurrent `query` sees
/// either all of a batch or none of it.
pub struct InMemoryVectorIndex {
    dimensions: usize,
    records: RwLock<Arc<Vec<Record>>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        check_pairing(chunks, embeddings, self.dimensions)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let mut guard = self.records.write().await;
        let mut next: Vec<Record> = Vec::with_capacity(guard.len() + chunks.len());
        next.extend(guard.iter().cloned());
        next.extend(
            chunks
                .iter()
                .zip(embeddings.iter())
                .map(|(chunk, vector)| Record {
                    chunk: chunk.clone(),
                    vector: vector.clone(),
                }),
        );
        *guard = Arc::new(next);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if vector.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        let snapshot = Arc::clone(&*self.records.read().await);

        let mut scored: Vec<(usize, f32)> = snapshot
            .iter()
            .enumerate()
            .map(|(position, record)| (position, dot(vector, &record.vector)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (position, score))| RetrievedChunk {
                rank: rank + 1,
                score,
                chunk: snapshot[position].chunk.clone(),
            })
            .collect())
    }

    async fn clear(&self) -> Result<(), SearchError> {
        *self.records.write().await = Arc::new(Vec::new());
        Ok(())
    }

    async fn len(&self) -> Result<usize, SearchError> {
        Ok(self.records.read().await.len())
    }
}

/// Cosine similarity of two vectors that are already unit length.
fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right.iter()).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(ordinal: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("chunk-{ordinal}"),
            document_id: "doc".to_string(),
            source: "doc.pdf".to_string(),
            page: 1,
            chunk_index: ordinal as u32,
            ordinal,
            char_start: 0,
            char_end: text.chars().count(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_index_returns_no_results() {
        let index = InMemoryVectorIndex::new(2);
        let hits = index.query(&[1.0, 0.0], 3).await.expect("query");
        assert!(hits.is_empty());
        assert_eq!(index.len().await.expect("len"), 0);
    }

    #[tokio::test]
    async fn results_are_ranked_by_similarity() {
        let index = InMemoryVectorIndex::new(2);
        index
            .add(
                &[chunk(0, "east"), chunk(1, "north"), chunk(2, "north-east")],
                &[
                    vec![1.0, 0.0],
                    vec![0.0, 1.0],
                    vec![std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2],
                ],
            )
            .await
            .expect("add");

        let hits = index.query(&[0.0, 1.0], 2).await.expect("query");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "north");
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[1].chunk.text, "north-east");
        assert_eq!(hits[1].rank, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn ties_follow_insertion_order_without_duplicates() {
        let index = InMemoryVectorIndex::new(2);
        let chunks = [chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        index
            .add(&chunks, &[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]])
            .await
            .expect("add");

        let hits = index.query(&[1.0, 0.0], 10).await.expect("query");
        let texts: Vec<_> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected() {
        let index = InMemoryVectorIndex::new(3);
        let added = index.add(&[chunk(0, "a")], &[vec![1.0, 0.0]]).await;
        assert!(matches!(
            added,
            Err(SearchError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(index.query(&[1.0], 1).await.is_err());
        assert_eq!(index.len().await.expect("len"), 0);
    }

    #[tokio::test]
    async fn clear_drops_all_records() {
        let index = InMemoryVectorIndex::new(2);
        index
            .add(&[chunk(0, "a")], &[vec![1.0, 0.0]])
            .await
            .expect("add");
        index.clear().await.expect("clear");
        assert_eq!(index.len().await.expect("len"), 0);
    }
}
