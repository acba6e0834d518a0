//! Thin HTTP adapter over the external k-NN search engine.
//!
//! The engine lives inside the cluster behind a self-signed certificate, so
//! the client authenticates with basic auth and deliberately skips TLS
//! verification. Everything else is a pass-through: the engine owns the
//! vector index, this client only speaks its REST surface.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use semdex_core::{Error, Result, SemdexConfig};

use crate::query::{knn_query, multi_field_knn_query};

/// Outcome of an index delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Absent,
}

/// One search hit with its engine id, score, and source document.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: f32,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

/// Engine capability consumed by the orchestrators. The HTTP client below is
/// the production implementation; tests swap in an in-memory engine.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;
    async fn create_index(&self, index: &str, mapping: &Value) -> Result<()>;
    async fn delete_index(&self, index: &str) -> Result<DeleteOutcome>;
    async fn doc_exists(&self, index: &str, id: &str) -> Result<bool>;
    async fn index_doc(&self, index: &str, id: &str, body: &Value) -> Result<()>;
    async fn knn_search(
        &self,
        index: &str,
        field: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>>;
    async fn multi_field_knn_search(
        &self,
        index: &str,
        weights: &[(String, f32)],
        vector: &[f32],
        k_per_field: usize,
    ) -> Result<Vec<SearchHit>>;
    async fn snapshot_create(&self, repo: &str, name: &str, indices: &[String]) -> Result<()>;
    async fn snapshot_restore(&self, repo: &str, name: &str, indices: &[String]) -> Result<()>;
}

pub struct OpenSearchClient {
    client: Client,
    base_url: String,
    user: String,
    key: String,
}

impl OpenSearchClient {
    pub fn from_config(config: &SemdexConfig) -> Result<Self> {
        let client = Client::builder()
            // Intra-cluster deployment with a self-signed certificate.
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Http(format!("cannot build engine client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.open_search_url.trim_end_matches('/').to_string(),
            user: config.open_search_user.clone(),
            key: config.open_search_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request
            .basic_auth(&self.user, Some(&self.key))
            .send()
            .await
            .map_err(|e| Error::Http(format!("engine unreachable: {e}")))
    }

    /// Map a non-success response to `EngineRejected` with the body text.
    async fn check(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::EngineRejected(format!("{context} ({status}): {body}")))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<SearchHit>> {
        let response = self
            .send(self.client.post(self.url(&format!("{index}/_search"))).json(body))
            .await?;
        let response = Self::check(response, "search").await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::EngineRejected(format!("unparseable search response: {e}")))?;
        Ok(parsed.hits.hits)
    }
}

fn snapshot_body(indices: &[String]) -> Value {
    if indices.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::json!({ "indices": indices.join(",") })
    }
}

#[async_trait]
impl SearchEngine for OpenSearchClient {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.send(self.client.head(self.url(index))).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::EngineRejected(format!(
                "exists check for '{index}' returned {status}"
            ))),
        }
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<()> {
        let response = self
            .send(self.client.put(self.url(index)).json(mapping))
            .await?;
        Self::check(response, "create index").await?;
        debug!("created index '{index}'");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<DeleteOutcome> {
        let response = self.send(self.client.delete(self.url(index))).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::Absent),
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::EngineRejected(format!(
                    "delete index '{index}' ({status}): {body}"
                )))
            }
        }
    }

    async fn doc_exists(&self, index: &str, id: &str) -> Result<bool> {
        let response = self
            .send(self.client.head(self.url(&format!("{index}/_doc/{id}"))))
            .await?;
        Ok(response.status() == StatusCode::OK)
    }

    async fn index_doc(&self, index: &str, id: &str, body: &Value) -> Result<()> {
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("{index}/_doc/{id}")))
                    .json(body),
            )
            .await?;
        Self::check(response, "index document").await?;
        Ok(())
    }

    async fn knn_search(
        &self,
        index: &str,
        field: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.search(index, &knn_query(field, vector, k)).await
    }

    async fn multi_field_knn_search(
        &self,
        index: &str,
        weights: &[(String, f32)],
        vector: &[f32],
        k_per_field: usize,
    ) -> Result<Vec<SearchHit>> {
        self.search(index, &multi_field_knn_query(weights, vector, k_per_field))
            .await
    }

    async fn snapshot_create(&self, repo: &str, name: &str, indices: &[String]) -> Result<()> {
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("_snapshot/{repo}/{name}")))
                    .json(&snapshot_body(indices)),
            )
            .await?;
        Self::check(response, "snapshot create").await?;
        Ok(())
    }

    async fn snapshot_restore(&self, repo: &str, name: &str, indices: &[String]) -> Result<()> {
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("_snapshot/{repo}/{name}/_restore")))
                    .json(&snapshot_body(indices)),
            )
            .await?;
        if let Err(e) = Self::check(response, "snapshot restore").await {
            warn!("snapshot restore failed: {e}");
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_hit_parsing() {
        let raw = serde_json::json!({
            "took": 4,
            "hits": {
                "total": { "value": 2 },
                "hits": [
                    { "_id": "abc", "_score": 0.9, "_source": { "input": "q1", "output": "a1" } },
                    { "_id": "def", "_score": 0.4, "_source": { "input": "q2", "output": "a2" } }
                ]
            }
        });
        let parsed: SearchResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.hits.hits.len(), 2);
        assert_eq!(parsed.hits.hits[0].id, "abc");
        assert_eq!(parsed.hits.hits[0].source["output"], "a1");
    }

    #[test]
    fn test_empty_hits_parse() {
        let parsed: SearchResponse =
            serde_json::from_value(serde_json::json!({ "hits": {} })).unwrap();
        assert!(parsed.hits.hits.is_empty());
    }

    #[test]
    fn test_snapshot_body_joins_indices() {
        let body = snapshot_body(&["documents".into(), "mitre".into()]);
        assert_eq!(body["indices"], "documents,mitre");
        assert_eq!(snapshot_body(&[]), serde_json::json!({}));
    }
}
