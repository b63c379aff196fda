//! Qdrant-backed [`VectorIndex`] over the HTTP API.
//!
//! Talks to a Qdrant collection via `reqwest`: `PUT /collections/<c>` to
//! create the collection on first upsert, `PUT /collections/<c>/points`
//! for upserts, `POST /collections/<c>/points/search` for queries, and
//! `POST /collections/<c>/points/delete` for removals.
//!
//! Connectivity failures and server errors surface as
//! [`IndexUnavailable`](crate::error::PipelineError::IndexUnavailable);
//! an unreachable backend is never reported as an empty result set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{PipelineError, Result};

use super::{IndexEntry, IndexHit, SearchFilter, VectorIndex};

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    collection_ready: AtomicBool,
}

impl QdrantIndex {
    pub fn new(base_url: &str, collection: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            api_key,
            collection_ready: AtomicBool::new(false),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    /// Create the collection if it does not exist yet (cosine distance,
    /// dimensionality taken from the first vector seen).
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        if self.collection_ready.load(Ordering::Relaxed) {
            return Ok(());
        }

        let exists = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await
            .map_err(unavailable)?;

        if !exists.status().is_success() {
            let resp = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/collections/{}", self.collection),
                )
                .json(&json!({
                    "vectors": { "size": dims, "distance": "Cosine" }
                }))
                .send()
                .await
                .map_err(unavailable)?;
            if !resp.status().is_success() {
                return Err(PipelineError::IndexUnavailable(format!(
                    "failed to create collection '{}': HTTP {}",
                    self.collection,
                    resp.status()
                )));
            }
        }

        self.collection_ready.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn build_filter(filter: &SearchFilter) -> Option<serde_json::Value> {
        let mut clauses = serde_json::Map::new();
        if let Some(ids) = &filter.document_ids {
            clauses.insert(
                "must".to_string(),
                json!([{ "key": "document_id", "match": { "any": ids.iter().collect::<Vec<_>>() } }]),
            );
        }
        if !filter.exclude_document_ids.is_empty() {
            clauses.insert(
                "must_not".to_string(),
                json!([{ "key": "document_id", "match": { "any": filter.exclude_document_ids.iter().collect::<Vec<_>>() } }]),
            );
        }
        if clauses.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(clauses))
        }
    }
}

fn unavailable(e: reqwest::Error) -> PipelineError {
    PipelineError::IndexUnavailable(e.to_string())
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        self.ensure_collection(first.vector.len()).await?;

        let points: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "id": e.chunk_id,
                    "vector": e.vector,
                    "payload": {
                        "document_id": e.document_id,
                        "chunk_index": e.chunk_index,
                        "text": e.text,
                    }
                })
            })
            .collect();

        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", self.collection),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::IndexUnavailable(format!(
                "upsert failed: HTTP {status}: {body}"
            )));
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<IndexHit>> {
        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(f) = Self::build_filter(filter) {
            body["filter"] = f;
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::IndexUnavailable(format!(
                "search failed: HTTP {status}: {text}"
            )));
        }

        let json: serde_json::Value = resp.json().await.map_err(unavailable)?;
        let hits = json
            .get("result")
            .and_then(|r| r.as_array())
            .ok_or_else(|| {
                PipelineError::IndexUnavailable("malformed search response".to_string())
            })?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let payload = hit.get("payload").cloned().unwrap_or(json!({}));
            out.push(IndexHit {
                chunk_id: hit
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                document_id: payload
                    .get("document_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                score: hit.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
                text: payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(out)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete?wait=true", self.collection),
            )
            .json(&json!({ "points": chunk_ids }))
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::IndexUnavailable(format!(
                "delete failed: HTTP {status}: {body}"
            )));
        }
        Ok(())
    }
}
