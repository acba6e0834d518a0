//! The record shapes this service indexes.
//!
//! Artefacts carry only data; all per-shape behavior (fields, modes, weights,
//! mappings) lives in the matching strategy. Embedding fields deserialize
//! empty and are filled exactly once before the record is written out.

use serde::{Deserialize, Serialize};

/// Question/answer record for the `documents` index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub input_embedding: Vec<f32>,
    #[serde(default)]
    pub output_embedding: Vec<f32>,
}

/// Book excerpt record for the `securitybooks` index, with a third
/// summary field and its own vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityBook {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub input_embedding: Vec<f32>,
    #[serde(default)]
    pub output_embedding: Vec<f32>,
    #[serde(default)]
    pub summary_embedding: Vec<f32>,
}

/// ATT&CK technique record for the `mitre` index; one vector over the
/// technique description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitreEntry {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// One item to be indexed, in any of the supported shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Artefact {
    Document(Document),
    SecurityBook(SecurityBook),
    Mitre(MitreEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_deserializes_without_embeddings() {
        let doc: Document =
            serde_json::from_str(r#"{"input": "q1", "output": "a1"}"#).unwrap();
        assert_eq!(doc.input, "q1");
        assert!(doc.input_embedding.is_empty());
        assert!(doc.output_embedding.is_empty());
    }

    #[test]
    fn test_security_book_keeps_existing_embeddings() {
        let book: SecurityBook = serde_json::from_str(
            r#"{"input": "q", "output": "a", "summary": "s", "summary_embedding": [0.5, 0.5]}"#,
        )
        .unwrap();
        assert_eq!(book.summary_embedding, vec![0.5, 0.5]);
        assert!(book.input_embedding.is_empty());
    }
}
