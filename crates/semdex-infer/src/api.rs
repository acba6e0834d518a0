//! Remote embedding provider for an OpenAI-compatible embeddings API.
//!
//! Requests are paced by the shared rate limiter. Inputs that exceed the
//! model's context window are truncated by decoding a token-id prefix back to
//! text and resent with a smaller cap; all other failures come back as the
//! empty vector so the caller can skip the item.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use semdex_core::{Error, Result, SemdexConfig};

use crate::provider::EmbeddingProvider;
use crate::rate_limit::RateLimiter;
use crate::tokenizer::TextTokenizer;

/// Hard cap on attempts per text, context-length retries included.
const MAX_ATTEMPTS: usize = 10;
/// Step the context cap shrinks by on a context-length rejection.
const CAP_STEP: usize = 500;
/// The cap never shrinks below this.
const CAP_FLOOR: usize = 500;

pub struct ApiProvider {
    client: Client,
    url: String,
    model: String,
    api_key: String,
    tokenizer: Arc<TextTokenizer>,
    limiter: RateLimiter,
    dimension: usize,
}

impl ApiProvider {
    pub fn from_config(config: &SemdexConfig, tokenizer: Arc<TextTokenizer>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.embedding_api_url.clone(),
            model: config.embedding_api_model.clone(),
            api_key: config.llm_hf_key.clone(),
            tokenizer,
            limiter: RateLimiter::new(),
            dimension: config.embedding_model_vec_dim,
        })
    }

    /// Truncate `text` to `cap` tokens by decoding the id prefix.
    fn truncate_to_cap(&self, text: &str, cap: usize) -> Result<String> {
        let ids = self.tokenizer.encode(text)?;
        if ids.len() <= cap {
            return Ok(text.to_string());
        }
        self.tokenizer.decode(&ids[..cap])
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// The API reports an over-long input with this phrase somewhere in the body.
fn is_context_length_error(body: &str) -> bool {
    body.to_lowercase().contains("maximum context length")
}

fn reduced_cap(cap: usize) -> usize {
    cap.saturating_sub(CAP_STEP).max(CAP_FLOOR)
}

#[async_trait]
impl EmbeddingProvider for ApiProvider {
    async fn embed(&self, text: &str, pad_to_tokens: usize, _pad: bool) -> Result<Vec<f32>> {
        let mut cap = pad_to_tokens;

        for attempt in 1..=MAX_ATTEMPTS {
            self.limiter.wait().await;

            let input = self.truncate_to_cap(text, cap)?;
            let request = EmbeddingRequest {
                model: &self.model,
                input: &input,
                encoding_format: "float",
            };

            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!("embedding API request failed: {e}");
                    self.limiter.notify_failure(false).await;
                    return Ok(Vec::new());
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = match response.json().await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("embedding API returned unparseable body: {e}");
                        self.limiter.notify_failure(false).await;
                        return Ok(Vec::new());
                    }
                };
                let embedding = parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .unwrap_or_default();
                if embedding.is_empty() {
                    self.limiter.notify_failure(false).await;
                    return Ok(Vec::new());
                }
                self.limiter.notify_success().await;
                return Ok(embedding);
            }

            let body = response.text().await.unwrap_or_default();
            if is_context_length_error(&body) {
                let next = reduced_cap(cap);
                debug!(
                    "context length exceeded on attempt {attempt}, reducing cap {cap} -> {next}"
                );
                cap = next;
                continue;
            }

            self.limiter
                .notify_failure(status == StatusCode::TOO_MANY_REQUESTS)
                .await;
            warn!("embedding API rejected request ({status}): {body}");
            return Ok(Vec::new());
        }

        warn!("embedding API retries exhausted after {MAX_ATTEMPTS} attempts");
        Ok(Vec::new())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
