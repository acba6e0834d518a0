//! Strategy for the `documents` index: question/answer pairs with one
//! vector per side.

use async_trait::async_trait;
use serde_json::Value;

use semdex_core::Result;
use semdex_infer::EmbeddingProvider;

use crate::artefact::{Artefact, Document};
use crate::strategy::{
    deserialize_items, fill_embedding, knn_index_mapping, sha256_hex, IndexStrategy, SearchMode,
};

pub struct DocumentStrategy;

const TEXT_FIELDS: &[&str] = &["input", "output"];
const VECTOR_FIELDS: &[&str] = &["input_embedding", "output_embedding"];

impl DocumentStrategy {
    fn unwrap<'a>(&self, item: &'a Artefact) -> &'a Document {
        match item {
            Artefact::Document(doc) => doc,
            other => panic!("documents strategy handed {other:?}"),
        }
    }
}

#[async_trait]
impl IndexStrategy for DocumentStrategy {
    fn index_name(&self) -> &'static str {
        "documents"
    }

    fn handles_item(&self, item: &Artefact) -> bool {
        matches!(item, Artefact::Document(_))
    }

    fn deserialize(&self, json: &str) -> Vec<Artefact> {
        deserialize_items::<Document>(self.index_name(), json)
            .into_iter()
            .map(Artefact::Document)
            .collect()
    }

    fn embed_fields<'a>(&self, item: &'a Artefact) -> Vec<&'a str> {
        let doc = self.unwrap(item);
        vec![&doc.input, &doc.output]
    }

    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<()> {
        let Artefact::Document(doc) = item else {
            return Ok(());
        };
        fill_embedding(&mut doc.input_embedding, &doc.input, provider, pad_to_tokens).await?;
        fill_embedding(&mut doc.output_embedding, &doc.output, provider, pad_to_tokens).await?;
        Ok(())
    }

    fn document_id(&self, item: &Artefact) -> String {
        sha256_hex(&self.unwrap(item).output)
    }

    fn index_document(&self, item: &Artefact) -> Value {
        let doc = self.unwrap(item);
        serde_json::json!({
            "input": doc.input,
            "output": doc.output,
            "input_embedding": doc.input_embedding,
            "output_embedding": doc.output_embedding,
        })
    }

    fn vector_field(&self, mode: SearchMode) -> &'static str {
        match mode {
            SearchMode::Question => "input_embedding",
            _ => "output_embedding",
        }
    }

    fn default_field_weights(&self) -> Vec<(String, f32)> {
        VECTOR_FIELDS.iter().map(|f| (f.to_string(), 1.0)).collect()
    }

    fn engine_mapping(&self, dimension: usize, engine: &str) -> Value {
        knn_index_mapping(TEXT_FIELDS, VECTOR_FIELDS, dimension, engine)
    }
}
