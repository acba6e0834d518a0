//! The per-index strategy contract and its shared helpers.
//!
//! One strategy per artefact shape. The pipeline code stays shape-agnostic:
//! it resolves a strategy by index name on ingress and dispatches every
//! shape-specific decision (fields, ids, mappings, weights) through this
//! trait.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use semdex_core::{Error, Result};
use semdex_infer::{EmbeddingProvider, TextTokenizer};

use crate::artefact::Artefact;
use crate::document::DocumentStrategy;
use crate::mitre::MitreStrategy;
use crate::security_book::SecurityBookStrategy;

/// How a query picks its vector field. Unknown modes degrade to `Content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Content,
    Question,
    Summary,
}

impl SearchMode {
    pub fn parse(mode: &str) -> Self {
        match mode.to_ascii_lowercase().as_str() {
            "question" => Self::Question,
            "summary" => Self::Summary,
            _ => Self::Content,
        }
    }
}

/// Result of a padding estimation pass over a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadEstimate {
    /// Clamped length future embedding calls must pad to.
    pub pad_to_tokens: usize,
    /// Largest token count actually observed, for diagnostics.
    pub observed_max: usize,
}

#[async_trait]
pub trait IndexStrategy: Send + Sync {
    /// Logical index this strategy owns. Unique across strategies.
    fn index_name(&self) -> &'static str;

    /// Name discrimination on the ingress path.
    fn can_handle(&self, index: &str) -> bool {
        index.eq_ignore_ascii_case(self.index_name())
    }

    /// Type discrimination on the mutation path.
    fn handles_item(&self, item: &Artefact) -> bool;

    /// Parse one JSON file into items. Malformed input yields an empty list.
    fn deserialize(&self, json: &str) -> Vec<Artefact>;

    /// Text fields that feed embeddings, used by padding estimation.
    fn embed_fields<'a>(&self, item: &'a Artefact) -> Vec<&'a str>;

    /// Fill every still-empty embedding field from its text field. An empty
    /// vector from the provider fails the item.
    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<()>;

    /// Deterministic document id: SHA-256 hex over the item's source field.
    fn document_id(&self, item: &Artefact) -> String;

    /// Engine document body with text fields and all vector fields.
    fn index_document(&self, item: &Artefact) -> Value;

    /// Vector field for a single-mode search.
    fn vector_field(&self, mode: SearchMode) -> &'static str;

    /// Fallback weights for multi-field search; all 1.0.
    fn default_field_weights(&self) -> Vec<(String, f32)>;

    /// Engine index mapping: lexical text fields plus HNSW/L2 `knn_vector`
    /// fields of the given dimension.
    fn engine_mapping(&self, dimension: usize, engine: &str) -> Value;
}

/// All known strategies, in ingress lookup order.
pub fn strategies() -> Vec<Arc<dyn IndexStrategy>> {
    vec![
        Arc::new(DocumentStrategy),
        Arc::new(SecurityBookStrategy),
        Arc::new(MitreStrategy),
    ]
}

/// Resolve the strategy owning `index`, if any.
pub fn strategy_for_index(index: &str) -> Option<Arc<dyn IndexStrategy>> {
    strategies().into_iter().find(|s| s.can_handle(index))
}

/// SHA-256 hex digest of a source field.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deserialize a JSON array of `T`; parse failure is an empty list, logged.
pub(crate) fn deserialize_items<T: serde::de::DeserializeOwned>(
    index: &str,
    json: &str,
) -> Vec<T> {
    match serde_json::from_str::<Vec<T>>(json) {
        Ok(items) => items,
        Err(e) => {
            warn!("cannot parse items for index '{index}': {e}");
            Vec::new()
        }
    }
}

/// Fill one embedding field if it is still empty. Filled fields are never
/// overwritten; the provider returning nothing fails the item.
pub(crate) async fn fill_embedding(
    field: &mut Vec<f32>,
    text: &str,
    provider: &dyn EmbeddingProvider,
    pad_to_tokens: usize,
) -> Result<()> {
    if !field.is_empty() {
        return Ok(());
    }
    let vector = provider.embed(text, pad_to_tokens, true).await?;
    if vector.is_empty() {
        return Err(Error::EmbeddingFailed(format!(
            "provider returned no vector for text of {} chars",
            text.len()
        )));
    }
    *field = vector;
    Ok(())
}

/// Index mapping shared by every strategy: k-NN enabled settings, `text`
/// lexical fields and HNSW/L2 vector fields.
pub(crate) fn knn_index_mapping(
    text_fields: &[&str],
    vector_fields: &[&str],
    dimension: usize,
    engine: &str,
) -> Value {
    let mut properties = serde_json::Map::new();
    for field in text_fields {
        properties.insert(field.to_string(), serde_json::json!({ "type": "text" }));
    }
    for field in vector_fields {
        properties.insert(
            field.to_string(),
            serde_json::json!({
                "type": "knn_vector",
                "dimension": dimension,
                "method": {
                    "name": "hnsw",
                    "space_type": "l2",
                    "engine": engine,
                }
            }),
        );
    }
    serde_json::json!({
        "settings": { "index": { "knn": true } },
        "mappings": { "properties": Value::Object(properties) },
    })
}

/// Scan a corpus and derive the pad length for one index.
///
/// Tokenizes every embedding-bearing field of every item, tracking the
/// running maximum. The scan short-circuits the moment the maximum reaches
/// `max_cap`; the final length is the observed maximum clamped into
/// `[min_cap, max_cap]`.
pub fn estimate_padding(
    strategy: &dyn IndexStrategy,
    files: &[PathBuf],
    tokenizer: &TextTokenizer,
    max_cap: usize,
    min_cap: usize,
) -> Result<PadEstimate> {
    let mut observed_max = 0usize;

    'scan: for file in files {
        let json = std::fs::read_to_string(file)?;
        for item in strategy.deserialize(&json) {
            for field in strategy.embed_fields(&item) {
                let count = tokenizer.count(field)?;
                if count > observed_max {
                    observed_max = count;
                }
                if observed_max >= max_cap {
                    debug!(
                        "padding estimation for '{}' hit the cap {max_cap}, stopping scan",
                        strategy.index_name()
                    );
                    break 'scan;
                }
            }
        }
    }

    Ok(PadEstimate {
        pad_to_tokens: observed_max.clamp(min_cap, max_cap),
        observed_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_infer::tokenizer::test_support::write_word_level_tokenizer;

    #[test]
    fn test_sha256_is_deterministic_on_bytes() {
        assert_eq!(sha256_hex("a1"), sha256_hex("a1"));
        assert_ne!(sha256_hex("a1"), sha256_hex("a2"));
        assert_eq!(sha256_hex("a1").len(), 64);
        assert!(sha256_hex("a1").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_search_mode_parse_degrades_to_content() {
        assert_eq!(SearchMode::parse("question"), SearchMode::Question);
        assert_eq!(SearchMode::parse("Summary"), SearchMode::Summary);
        assert_eq!(SearchMode::parse("content"), SearchMode::Content);
        assert_eq!(SearchMode::parse("who-knows"), SearchMode::Content);
    }

    #[test]
    fn test_strategy_lookup_by_index_name() {
        assert!(strategy_for_index("documents").is_some());
        assert!(strategy_for_index("SECURITYBOOKS").is_some());
        assert!(strategy_for_index("mitre").is_some());
        assert!(strategy_for_index("unknown").is_none());
    }

    #[test]
    fn test_index_names_are_unique() {
        let names: Vec<&str> = strategies().iter().map(|s| s.index_name()).collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
    }

    #[test]
    fn test_knn_mapping_declares_every_field() {
        let mapping = knn_index_mapping(
            &["input", "output"],
            &["input_embedding", "output_embedding"],
            128,
            "faiss",
        );
        assert_eq!(mapping["settings"]["index"]["knn"], true);
        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["input"]["type"], "text");
        assert_eq!(props["input_embedding"]["type"], "knn_vector");
        assert_eq!(props["input_embedding"]["dimension"], 128);
        assert_eq!(props["output_embedding"]["method"]["name"], "hnsw");
        assert_eq!(props["output_embedding"]["method"]["space_type"], "l2");
        assert_eq!(props["output_embedding"]["method"]["engine"], "faiss");
    }

    fn write_corpus(dir: &std::path::Path, name: &str, items: serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(&items).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_estimate_padding_clamps_to_floor() {
        let dir = tempfile::tempdir().unwrap();
        write_word_level_tokenizer(dir.path());
        let tokenizer = TextTokenizer::load(dir.path()).unwrap();
        let file = write_corpus(
            dir.path(),
            "a.json",
            serde_json::json!([{ "input": "alert", "output": "firewall dropped packet" }]),
        );

        let strategy = DocumentStrategy;
        let estimate = estimate_padding(&strategy, &[file], &tokenizer, 512, 64).unwrap();
        assert_eq!(estimate.observed_max, 3);
        assert_eq!(estimate.pad_to_tokens, 64);
    }

    #[test]
    fn test_estimate_padding_early_exit_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        write_word_level_tokenizer(dir.path());
        let tokenizer = TextTokenizer::load(dir.path()).unwrap();

        let long_text = vec!["packet"; 10].join(" ");
        let first = write_corpus(
            dir.path(),
            "a.json",
            serde_json::json!([{ "input": "alert", "output": long_text }]),
        );
        // A second file that would push the max higher is never reached.
        let unreachable = dir.path().join("b.json");
        std::fs::write(&unreachable, "this is not even valid json").unwrap();

        let strategy = DocumentStrategy;
        let estimate =
            estimate_padding(&strategy, &[first, unreachable], &tokenizer, 10, 4).unwrap();
        assert_eq!(estimate.observed_max, 10);
        assert_eq!(estimate.pad_to_tokens, 10);
    }

    #[test]
    fn test_estimate_padding_between_caps_uses_observed() {
        let dir = tempfile::tempdir().unwrap();
        write_word_level_tokenizer(dir.path());
        let tokenizer = TextTokenizer::load(dir.path()).unwrap();

        let text = vec!["scan"; 6].join(" ");
        let file = write_corpus(
            dir.path(),
            "a.json",
            serde_json::json!([{ "input": "alert", "output": text }]),
        );

        let strategy = DocumentStrategy;
        let estimate = estimate_padding(&strategy, &[file], &tokenizer, 512, 2).unwrap();
        assert_eq!(estimate.pad_to_tokens, 6);
        assert_eq!(estimate.observed_max, 6);
    }
}
