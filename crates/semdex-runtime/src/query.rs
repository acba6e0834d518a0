//! Query orchestration: request → embed → k-NN dispatch → projected hits.
//!
//! Queries embed without padding but against the index's registered pad
//! length, so the query vector inhabits the same space as stored vectors.
//! Results are cached per `(index, query)` until the process restarts; the
//! cache is advisory, never authoritative.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use semdex_core::{Error, QueryHit, QueryIndexReply, QueryIndexRequest, SemdexConfig};
use semdex_index::{strategies, IndexStrategy, PadLengthRegistry, SearchMode};
use semdex_infer::EmbeddingProvider;
use semdex_search::{SearchEngine, SearchHit};

/// Hits returned for a single-field search.
const K: usize = 3;
/// Hits requested per field for a multi-field search.
const K_PER_FIELD: usize = 3;

/// Ageless `(index, query) → hits` cache, cleared only on restart.
/// Concurrent reads; a concurrent write wins last.
pub struct ResultCache {
    inner: RwLock<HashMap<(String, String), Vec<QueryHit>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, index: &str, query: &str) -> Option<Vec<QueryHit>> {
        self.inner
            .read()
            .get(&(index.to_string(), query.to_string()))
            .cloned()
    }

    pub fn put(&self, index: &str, query: &str, hits: Vec<QueryHit>) {
        self.inner
            .write()
            .insert((index.to_string(), query.to_string()), hits);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct QueryOrchestrator {
    engine: Arc<dyn SearchEngine>,
    provider: Arc<dyn EmbeddingProvider>,
    registry: Arc<PadLengthRegistry>,
    strategies: Vec<Arc<dyn IndexStrategy>>,
    cache: ResultCache,
    min_token_length_cap: usize,
}

impl QueryOrchestrator {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        provider: Arc<dyn EmbeddingProvider>,
        registry: Arc<PadLengthRegistry>,
        config: &SemdexConfig,
    ) -> Self {
        Self {
            engine,
            provider,
            registry,
            strategies: strategies(),
            cache: ResultCache::new(),
            min_token_length_cap: config.min_token_length_cap,
        }
    }

    pub async fn query(&self, request: &QueryIndexRequest) -> QueryIndexReply {
        if request.index_name.is_empty() || request.query_text.is_empty() {
            return failure(
                Error::InvalidRequest("indexName and queryText are required".into()).to_string(),
            );
        }

        if let Some(hits) = self.cache.get(&request.index_name, &request.query_text) {
            debug!(
                "query cache hit for '{}' ({} hits)",
                request.index_name,
                hits.len()
            );
            return success(hits);
        }

        let Some(strategy) = self
            .strategies
            .iter()
            .find(|s| s.can_handle(&request.index_name))
        else {
            return failure(format!(
                "no strategy handles index '{}'",
                request.index_name
            ));
        };

        // Align the query with the space the documents were embedded in;
        // an unindexed corpus falls back to the configured floor.
        let pad_to_tokens = self
            .registry
            .get(&request.index_name)
            .map(|record| record.pad_to_tokens)
            .unwrap_or(self.min_token_length_cap);

        let vector = match self
            .provider
            .embed(&request.query_text, pad_to_tokens, false)
            .await
        {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return failure("embedding failed: provider returned no vector"),
            Err(e) => return failure(format!("embedding failed: {e}")),
        };

        let searched = match &request.vector_search_mode {
            Some(mode) => {
                let field = strategy.vector_field(SearchMode::parse(mode));
                self.engine
                    .knn_search(&request.index_name, field, &vector, K)
                    .await
            }
            None => {
                let weights = resolve_weights(
                    strategy.default_field_weights(),
                    request.field_weights.as_ref(),
                );
                self.engine
                    .multi_field_knn_search(&request.index_name, &weights, &vector, K_PER_FIELD)
                    .await
            }
        };

        let hits = match searched {
            Ok(hits) => project_hits(hits),
            Err(e) => return failure(format!("search failed: {e}")),
        };

        info!(
            "query against '{}' returned {} hits",
            request.index_name,
            hits.len()
        );
        self.cache
            .put(&request.index_name, &request.query_text, hits.clone());
        success(hits)
    }
}

/// Strategy defaults with request overrides applied per field.
fn resolve_weights(
    defaults: Vec<(String, f32)>,
    overrides: Option<&HashMap<String, f32>>,
) -> Vec<(String, f32)> {
    match overrides {
        None => defaults,
        Some(map) => defaults
            .into_iter()
            .map(|(field, weight)| {
                let weight = map.get(&field).copied().unwrap_or(weight);
                (field, weight)
            })
            .collect(),
    }
}

/// Keep only the lexical pair the caller consumes.
fn project_hits(hits: Vec<SearchHit>) -> Vec<QueryHit> {
    hits.into_iter()
        .map(|hit| QueryHit {
            input: hit.source["input"].as_str().unwrap_or_default().to_string(),
            output: hit.source["output"].as_str().unwrap_or_default().to_string(),
        })
        .collect()
}

fn success(hits: Vec<QueryHit>) -> QueryIndexReply {
    QueryIndexReply {
        success: true,
        message: format!("{} hits", hits.len()),
        query_results: hits,
    }
}

fn failure(message: impl Into<String>) -> QueryIndexReply {
    QueryIndexReply {
        success: false,
        message: message.into(),
        query_results: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_cache_round_trip() {
        let cache = ResultCache::new();
        assert!(cache.get("documents", "q").is_none());

        let hits = vec![QueryHit {
            input: "q".into(),
            output: "a".into(),
        }];
        cache.put("documents", "q", hits.clone());
        assert_eq!(cache.get("documents", "q"), Some(hits));
        // Same query against another index is a different key.
        assert!(cache.get("mitre", "q").is_none());
    }

    #[test]
    fn test_result_cache_last_writer_wins() {
        let cache = ResultCache::new();
        cache.put("documents", "q", vec![]);
        let newer = vec![QueryHit {
            input: "q".into(),
            output: "fresh".into(),
        }];
        cache.put("documents", "q", newer.clone());
        assert_eq!(cache.get("documents", "q"), Some(newer));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_weights_overrides_by_field() {
        let defaults = vec![
            ("input_embedding".to_string(), 1.0),
            ("summary_embedding".to_string(), 1.0),
        ];
        let mut overrides = HashMap::new();
        overrides.insert("summary_embedding".to_string(), 4.0);

        let resolved = resolve_weights(defaults.clone(), Some(&overrides));
        assert_eq!(resolved[0], ("input_embedding".to_string(), 1.0));
        assert_eq!(resolved[1], ("summary_embedding".to_string(), 4.0));

        assert_eq!(resolve_weights(defaults.clone(), None), defaults);
    }

    #[test]
    fn test_project_hits_reads_source_fields() {
        let hits = vec![SearchHit {
            id: "x".into(),
            score: 0.8,
            source: serde_json::json!({ "input": "q1", "output": "a1", "extra": 1 }),
        }];
        let projected = project_hits(hits);
        assert_eq!(
            projected,
            vec![QueryHit {
                input: "q1".into(),
                output: "a1".into()
            }]
        );
    }
}
