//! Embedding provider contract.
//!
//! Callers never branch on the backend: the local ONNX session and the
//! remote embeddings API expose the same capability. An empty returned
//! vector signals a soft per-text failure (the caller decides whether that
//! skips the item); hard errors are reserved for unusable models.

use async_trait::async_trait;

use semdex_core::Result;

/// Text → fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. `pad_to_tokens` is the index's registered pad length;
    /// `pad` selects padded tokenization (document path) or natural-length
    /// tokenization (query path).
    async fn embed(&self, text: &str, pad_to_tokens: usize, pad: bool) -> Result<Vec<f32>>;

    /// Embed several texts. Backends override this when they can batch the
    /// underlying inference call.
    async fn embed_batch(
        &self,
        texts: &[String],
        pad_to_tokens: usize,
        pad: bool,
    ) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, pad_to_tokens, pad).await?);
        }
        Ok(out)
    }

    /// Declared output dimension.
    fn dimension(&self) -> usize;
}

/// Deterministic hashing-trick provider.
///
/// Not a neural model: each whitespace token increments one dimension picked
/// by its hash, and the vector is L2-normalized. Identical texts always map
/// to identical vectors, which is what offline tests need.
pub struct HashProvider {
    dim: usize,
}

impl HashProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn token_slot(&self, token: &str) -> usize {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() % self.dim as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    async fn embed(&self, text: &str, _pad_to_tokens: usize, _pad: bool) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            vector[self.token_slot(&token.to_lowercase())] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_provider_is_deterministic() {
        let provider = HashProvider::new(64);
        let a = provider.embed("firewall dropped packet", 128, true).await.unwrap();
        let b = provider.embed("firewall dropped packet", 128, true).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_hash_provider_distinguishes_texts() {
        let provider = HashProvider::new(64);
        let a = provider.embed("port scan from subnet", 128, true).await.unwrap();
        let b = provider.embed("routine dns lookup", 128, true).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_hash_provider_empty_text_yields_full_width_vector() {
        let provider = HashProvider::new(32);
        let v = provider.embed("", 128, false).await.unwrap();
        assert_eq!(v.len(), 32);
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let provider = HashProvider::new(16);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = provider.embed_batch(&texts, 128, true).await.unwrap();
        assert_eq!(batch[0], provider.embed("one", 128, true).await.unwrap());
        assert_eq!(batch[1], provider.embed("two", 128, true).await.unwrap());
    }
}
