use crate::traits::{check_pairing, VectorIndex};
use crate::{DocumentChunk, RetrievedChunk, SearchError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Vector index backed by a Qdrant collection over its REST API.
pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            endpoint: Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))?,
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
            vector_size,
        })
    }

    fn collection_url(&self, suffix: &str) -> Result<Url, SearchError> {
        Ok(self
            .endpoint
            .join(&format!("collections/{}{}", self.collection, suffix))?)
    }

    /// Creates the collection with cosine distance unless it already exists.
    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url("")?).send().await?;
        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            let existing = parsed
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64);
            return match existing {
                Some(size) if size as usize != self.vector_size => {
                    Err(SearchError::DimensionMismatch {
                        expected: size as usize,
                        actual: self.vector_size,
                    })
                }
                _ => Ok(()),
            };
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url("")?)
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;
        expect_success(response)?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn add(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        check_pairing(chunks, embeddings, self.vector_size)?;

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| -> Result<Value, SearchError> {
                Ok(json!({
                    "id": chunk.ordinal,
                    "vector": embedding,
                    "payload": serde_json::to_value(chunk)?,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        self.ensure_collection().await?;

        // One request per batch: Qdrant applies a single upsert atomically.
        let response = self
            .client
            .put(self.collection_url("/points?wait=true")?)
            .json(&json!({ "points": points }))
            .send()
            .await?;
        expect_success(response)?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if vector.len() != self.vector_size {
            return Err(SearchError::DimensionMismatch {
                expected: self.vector_size,
                actual: vector.len(),
            });
        }

        let response = self
            .client
            .post(self.collection_url("/points/search")?)
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = expect_success(response)?;

        let parsed: Value = response.json().await?;
        parse_hits(&parsed)
    }

    async fn clear(&self) -> Result<(), SearchError> {
        let response = self.client.delete(self.collection_url("")?).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            expect_success(response)?;
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, SearchError> {
        let response = self
            .client
            .post(self.collection_url("/points/count")?)
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let response = expect_success(response)?;

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

fn backend_error(status: StatusCode) -> SearchError {
    SearchError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn expect_success(response: Response) -> Result<Response, SearchError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(backend_error(response.status()))
    }
}

fn parse_hits(parsed: &Value) -> Result<Vec<RetrievedChunk>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let payload = hit.get("payload").cloned().ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search hit without payload".to_string(),
        })?;
        let chunk: DocumentChunk = serde_json::from_value(payload)?;

        result.push(RetrievedChunk {
            rank: result.len() + 1,
            score,
            chunk,
        });
    }

    Ok(result)
}
