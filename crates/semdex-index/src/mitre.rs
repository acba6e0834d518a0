//! Strategy for the `mitre` index: technique records with one vector over
//! the description.

use async_trait::async_trait;
use serde_json::Value;

use semdex_core::Result;
use semdex_infer::EmbeddingProvider;

use crate::artefact::{Artefact, MitreEntry};
use crate::strategy::{
    deserialize_items, fill_embedding, knn_index_mapping, sha256_hex, IndexStrategy, SearchMode,
};

pub struct MitreStrategy;

const TEXT_FIELDS: &[&str] = &["input", "output"];
const VECTOR_FIELDS: &[&str] = &["embedding"];

impl MitreStrategy {
    fn unwrap<'a>(&self, item: &'a Artefact) -> &'a MitreEntry {
        match item {
            Artefact::Mitre(entry) => entry,
            other => panic!("mitre strategy handed {other:?}"),
        }
    }
}

#[async_trait]
impl IndexStrategy for MitreStrategy {
    fn index_name(&self) -> &'static str {
        "mitre"
    }

    fn handles_item(&self, item: &Artefact) -> bool {
        matches!(item, Artefact::Mitre(_))
    }

    fn deserialize(&self, json: &str) -> Vec<Artefact> {
        deserialize_items::<MitreEntry>(self.index_name(), json)
            .into_iter()
            .map(Artefact::Mitre)
            .collect()
    }

    fn embed_fields<'a>(&self, item: &'a Artefact) -> Vec<&'a str> {
        vec![&self.unwrap(item).output]
    }

    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<()> {
        let Artefact::Mitre(entry) = item else {
            return Ok(());
        };
        fill_embedding(&mut entry.embedding, &entry.output, provider, pad_to_tokens).await
    }

    fn document_id(&self, item: &Artefact) -> String {
        sha256_hex(&self.unwrap(item).output)
    }

    fn index_document(&self, item: &Artefact) -> Value {
        let entry = self.unwrap(item);
        serde_json::json!({
            "input": entry.input,
            "output": entry.output,
            "embedding": entry.embedding,
        })
    }

    /// Single vector field; every mode resolves to it.
    fn vector_field(&self, _mode: SearchMode) -> &'static str {
        "embedding"
    }

    fn default_field_weights(&self) -> Vec<(String, f32)> {
        VECTOR_FIELDS.iter().map(|f| (f.to_string(), 1.0)).collect()
    }

    fn engine_mapping(&self, dimension: usize, engine: &str) -> Value {
        knn_index_mapping(TEXT_FIELDS, VECTOR_FIELDS, dimension, engine)
    }
}
