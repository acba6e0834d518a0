//! Local ONNX embedding provider.
//!
//! Owns one inference session behind a FIFO async gate — the session is not
//! safe for concurrent use, so every invocation takes the lane exclusively
//! and waiters can be cancelled while queued. Output tensors are accepted as
//! float32, float16 (widened) or uint8 (dequantized with per-model
//! parameters), then mean-pooled under the attention mask.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokio::sync::Mutex;
use tracing::{info, warn};

use semdex_core::{Error, ExtraModelInput, Result, SemdexConfig};

use crate::pooling::{dequantize_u8, mean_pool_batch, widen_f16};
use crate::provider::EmbeddingProvider;
use crate::tokenizer::{TextTokenizer, TokenizedInput};

pub struct OnnxProvider {
    session: Mutex<Session>,
    tokenizer: Arc<TextTokenizer>,
    dimension: usize,
    extra_input: ExtraModelInput,
    quant_scale: f32,
    quant_zero_point: i32,
}

impl OnnxProvider {
    /// Load `model.onnx` from the configured model directory, sharing the
    /// process-wide tokenizer.
    pub fn from_config(config: &SemdexConfig, tokenizer: Arc<TextTokenizer>) -> Result<Self> {
        let model_dir: &Path = &config.embedding_model_dir;
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(Error::InvalidModel(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        ort::init().commit();
        let session = Session::builder()
            .map_err(|e| Error::InvalidModel(format!("session builder: {e}")))?
            .with_intra_threads(config.llm_threads)
            .map_err(|e| Error::InvalidModel(format!("session threads: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| Error::InvalidModel(format!("cannot load ONNX model: {e}")))?;

        info!(
            "ONNX provider loaded: dim={}, extra_input={:?}, model={}",
            config.embedding_model_vec_dim,
            config.onnx_extra_input,
            model_path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.embedding_model_vec_dim,
            extra_input: config.onnx_extra_input,
            quant_scale: config.quant_scale,
            quant_zero_point: config.quant_zero_point,
        })
    }

    /// Run the session on a batch of equal-length sequences and pool the
    /// hidden states.
    async fn run_pooled(&self, inputs: &[TokenizedInput]) -> Result<Vec<Vec<f32>>> {
        let batch = inputs.len();
        if batch == 0 {
            return Ok(Vec::new());
        }
        let seq_len = inputs[0].len();
        if inputs.iter().any(|t| t.len() != seq_len) {
            return Err(Error::Internal(
                "batched sequences must share one length".into(),
            ));
        }
        if seq_len == 0 {
            // Nothing to feed the model; pooling over zero positions is the
            // zero vector.
            return Ok(vec![vec![0.0; self.dimension]; batch]);
        }

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        let mut masks = Vec::with_capacity(batch);
        for item in inputs {
            ids.extend_from_slice(&item.input_ids);
            mask.extend_from_slice(&item.attention_mask);
            masks.push(item.attention_mask.clone());
        }
        let extra = extra_input_values(self.extra_input, inputs, seq_len);
        let extra_name = extra_input_name(self.extra_input);

        let ids_tensor = Tensor::from_array(([batch, seq_len], ids))
            .map_err(|e| Error::Internal(format!("input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array(([batch, seq_len], mask))
            .map_err(|e| Error::Internal(format!("attention_mask tensor: {e}")))?;
        let extra_tensor = Tensor::from_array(([batch, seq_len], extra))
            .map_err(|e| Error::Internal(format!("{extra_name} tensor: {e}")))?;

        let mut session = self.session.lock().await;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                extra_name => extra_tensor,
            ])
            .map_err(|e| Error::Internal(format!("ONNX inference failed: {e}")))?;

        // Prefer the first float32 output, then float16, then uint8.
        let mut extracted: Option<(Vec<i64>, Vec<f32>)> = None;
        for i in 0..outputs.len() {
            if let Ok((shape, data)) = outputs[i].try_extract_tensor::<f32>() {
                extracted = Some((shape.iter().copied().collect(), data.to_vec()));
                break;
            }
        }
        if extracted.is_none() {
            for i in 0..outputs.len() {
                if let Ok((shape, data)) = outputs[i].try_extract_tensor::<half::f16>() {
                    extracted = Some((shape.iter().copied().collect(), widen_f16(data)));
                    break;
                }
            }
        }
        if extracted.is_none() {
            for i in 0..outputs.len() {
                if let Ok((shape, data)) = outputs[i].try_extract_tensor::<u8>() {
                    extracted = Some((
                        shape.iter().copied().collect(),
                        dequantize_u8(data, self.quant_scale, self.quant_zero_point),
                    ));
                    break;
                }
            }
        }
        let (shape, data) = extracted.ok_or_else(|| {
            Error::UnsupportedOutput("no float32/float16/uint8 output tensor".into())
        })?;

        let pooled = match shape.len() {
            // [batch, seq_len, dim] token states need pooling.
            3 => {
                let dim = shape[2] as usize;
                if dim != self.dimension {
                    warn!(
                        "model hidden size {} differs from configured dimension {}",
                        dim, self.dimension
                    );
                }
                mean_pool_batch(&data, &masks, seq_len, dim)
                    .into_iter()
                    .map(|v| v.to_vec())
                    .collect()
            }
            // [batch, dim] is already pooled.
            2 => {
                let dim = shape[1] as usize;
                data.chunks(dim).map(|row| row.to_vec()).collect()
            }
            other => {
                return Err(Error::UnsupportedOutput(format!(
                    "unexpected output rank {other}"
                )));
            }
        };

        Ok(pooled)
    }
}

fn extra_input_name(extra: ExtraModelInput) -> &'static str {
    match extra {
        ExtraModelInput::PositionIds => "position_ids",
        ExtraModelInput::TokenTypeIds => "token_type_ids",
    }
}

/// Values for the configured third input: positional indices `0..L` per row,
/// or the (all-zero) token-type ids. The two are distinct model inputs and
/// are never aliased onto each other.
fn extra_input_values(
    extra: ExtraModelInput,
    inputs: &[TokenizedInput],
    seq_len: usize,
) -> Vec<i64> {
    match extra {
        ExtraModelInput::PositionIds => inputs
            .iter()
            .flat_map(|_| 0..seq_len as i64)
            .collect(),
        ExtraModelInput::TokenTypeIds => inputs
            .iter()
            .flat_map(|t| t.token_type_ids.iter().copied())
            .collect(),
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxProvider {
    async fn embed(&self, text: &str, pad_to_tokens: usize, pad: bool) -> Result<Vec<f32>> {
        let tokenized = if pad {
            self.tokenizer.tokenize(text, pad_to_tokens)?
        } else {
            self.tokenizer.tokenize_no_pad(text)?
        };
        let mut pooled = self.run_pooled(std::slice::from_ref(&tokenized)).await?;
        Ok(pooled.pop().unwrap_or_default())
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        pad_to_tokens: usize,
        pad: bool,
    ) -> Result<Vec<Vec<f32>>> {
        if !pad {
            // Natural-length sequences differ per text; run them one by one.
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text, pad_to_tokens, false).await?);
            }
            return Ok(out);
        }

        let mut tokenized = Vec::with_capacity(texts.len());
        for text in texts {
            tokenized.push(self.tokenizer.tokenize(text, pad_to_tokens)?);
        }
        self.run_pooled(&tokenized).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(ids: Vec<i64>, mask: Vec<i64>) -> TokenizedInput {
        let len = ids.len();
        TokenizedInput {
            input_ids: ids,
            attention_mask: mask,
            token_type_ids: vec![0; len],
        }
    }

    #[test]
    fn test_position_ids_restart_per_row() {
        let inputs = vec![
            padded(vec![2, 3, 0], vec![1, 1, 0]),
            padded(vec![4, 0, 0], vec![1, 0, 0]),
        ];
        let values = extra_input_values(ExtraModelInput::PositionIds, &inputs, 3);
        assert_eq!(values, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_token_type_ids_stay_zero() {
        let inputs = vec![padded(vec![2, 3], vec![1, 1])];
        let values = extra_input_values(ExtraModelInput::TokenTypeIds, &inputs, 2);
        assert_eq!(values, vec![0, 0]);
    }

    #[test]
    fn test_extra_input_names() {
        assert_eq!(extra_input_name(ExtraModelInput::PositionIds), "position_ids");
        assert_eq!(
            extra_input_name(ExtraModelInput::TokenTypeIds),
            "token_type_ids"
        );
    }
}
