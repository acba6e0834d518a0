//! Strategy for the `securitybooks` index: book excerpts with an extra
//! summary field and a vector per text field.

use async_trait::async_trait;
use serde_json::Value;

use semdex_core::Result;
use semdex_infer::EmbeddingProvider;

use crate::artefact::{Artefact, SecurityBook};
use crate::strategy::{
    deserialize_items, fill_embedding, knn_index_mapping, sha256_hex, IndexStrategy, SearchMode,
};

pub struct SecurityBookStrategy;

const TEXT_FIELDS: &[&str] = &["input", "output", "summary"];
const VECTOR_FIELDS: &[&str] = &["input_embedding", "output_embedding", "summary_embedding"];

impl SecurityBookStrategy {
    fn unwrap<'a>(&self, item: &'a Artefact) -> &'a SecurityBook {
        match item {
            Artefact::SecurityBook(book) => book,
            other => panic!("securitybooks strategy handed {other:?}"),
        }
    }
}

#[async_trait]
impl IndexStrategy for SecurityBookStrategy {
    fn index_name(&self) -> &'static str {
        "securitybooks"
    }

    fn handles_item(&self, item: &Artefact) -> bool {
        matches!(item, Artefact::SecurityBook(_))
    }

    fn deserialize(&self, json: &str) -> Vec<Artefact> {
        deserialize_items::<SecurityBook>(self.index_name(), json)
            .into_iter()
            .map(Artefact::SecurityBook)
            .collect()
    }

    fn embed_fields<'a>(&self, item: &'a Artefact) -> Vec<&'a str> {
        let book = self.unwrap(item);
        vec![&book.input, &book.output, &book.summary]
    }

    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<()> {
        let Artefact::SecurityBook(book) = item else {
            return Ok(());
        };
        fill_embedding(&mut book.input_embedding, &book.input, provider, pad_to_tokens).await?;
        fill_embedding(&mut book.output_embedding, &book.output, provider, pad_to_tokens)
            .await?;
        fill_embedding(
            &mut book.summary_embedding,
            &book.summary,
            provider,
            pad_to_tokens,
        )
        .await?;
        Ok(())
    }

    fn document_id(&self, item: &Artefact) -> String {
        sha256_hex(&self.unwrap(item).output)
    }

    fn index_document(&self, item: &Artefact) -> Value {
        let book = self.unwrap(item);
        serde_json::json!({
            "input": book.input,
            "output": book.output,
            "summary": book.summary,
            "input_embedding": book.input_embedding,
            "output_embedding": book.output_embedding,
            "summary_embedding": book.summary_embedding,
        })
    }

    fn vector_field(&self, mode: SearchMode) -> &'static str {
        match mode {
            SearchMode::Question => "input_embedding",
            SearchMode::Summary => "summary_embedding",
            SearchMode::Content => "output_embedding",
        }
    }

    fn default_field_weights(&self) -> Vec<(String, f32)> {
        VECTOR_FIELDS.iter().map(|f| (f.to_string(), 1.0)).collect()
    }

    fn engine_mapping(&self, dimension: usize, engine: &str) -> Value {
        knn_index_mapping(TEXT_FIELDS, VECTOR_FIELDS, dimension, engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_infer::HashProvider;

    #[test]
    fn test_deserialize_and_discriminate() {
        let items = SecurityBookStrategy.deserialize(
            r#"[{"input": "q", "output": "a", "summary": "short"}]"#,
        );
        assert_eq!(items.len(), 1);
        assert!(SecurityBookStrategy.handles_item(&items[0]));
        assert!(!crate::document::DocumentStrategy.handles_item(&items[0]));
    }

    #[tokio::test]
    async fn test_ensure_embeddings_fills_all_three() {
        let provider = HashProvider::new(16);
        let mut item = SecurityBookStrategy
            .deserialize(r#"[{"input": "q", "output": "a", "summary": "s"}]"#)
            .remove(0);
        SecurityBookStrategy
            .ensure_embeddings(&mut item, &provider, 64)
            .await
            .unwrap();
        let Artefact::SecurityBook(book) = &item else { unreachable!() };
        assert_eq!(book.input_embedding.len(), 16);
        assert_eq!(book.output_embedding.len(), 16);
        assert_eq!(book.summary_embedding.len(), 16);
    }

    #[test]
    fn test_vector_field_covers_all_modes() {
        assert_eq!(
            SecurityBookStrategy.vector_field(SearchMode::Question),
            "input_embedding"
        );
        assert_eq!(
            SecurityBookStrategy.vector_field(SearchMode::Summary),
            "summary_embedding"
        );
        assert_eq!(
            SecurityBookStrategy.vector_field(SearchMode::Content),
            "output_embedding"
        );
    }

    #[test]
    fn test_mapping_declares_summary_vector() {
        let mapping = SecurityBookStrategy.engine_mapping(384, "nmslib");
        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["summary"]["type"], "text");
        assert_eq!(props["summary_embedding"]["type"], "knn_vector");
        assert_eq!(props["summary_embedding"]["dimension"], 384);
    }
}
