//! Semdex Infer — tokenizer, embedding providers, rate limiter.
//!
//! Provides the `EmbeddingProvider` capability over two interchangeable
//! backends: a local ONNX inference session and a remote OpenAI-compatible
//! embeddings API. Callers select one at startup via `create_provider` and
//! never branch on the variant afterwards.

pub mod api;
pub mod onnx;
pub mod pooling;
pub mod provider;
pub mod rate_limit;
pub mod tokenizer;

use std::sync::Arc;

use semdex_core::{EmbeddingProviderKind, Result, SemdexConfig};

pub use api::ApiProvider;
pub use onnx::OnnxProvider;
pub use provider::{EmbeddingProvider, HashProvider};
pub use rate_limit::RateLimiter;
pub use tokenizer::{TextTokenizer, TokenizedInput};

/// Build the configured embedding backend over the shared tokenizer.
pub fn create_provider(
    config: &SemdexConfig,
    tokenizer: Arc<TextTokenizer>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding_provider {
        EmbeddingProviderKind::Local => {
            let provider = OnnxProvider::from_config(config, tokenizer)?;
            tracing::info!("using local ONNX embedding provider (dim={})", provider.dimension());
            Ok(Arc::new(provider))
        }
        EmbeddingProviderKind::Api => {
            let provider = ApiProvider::from_config(config, tokenizer)?;
            tracing::info!(
                "using remote embedding provider at {} (dim={})",
                config.embedding_api_url,
                provider.dimension()
            );
            Ok(Arc::new(provider))
        }
    }
}
