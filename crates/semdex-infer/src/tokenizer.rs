//! Tokenizer wrapper over a prebuilt fast-tokenizer manifest.
//!
//! Loads `tokenizer.json`, `tokenizer_config.json` and a vocabulary file from
//! the model directory, resolves the pad-token id by symbol lookup, and
//! produces the fixed-shape integer sequences the inference session expects.

use std::collections::HashMap;
use std::path::Path;

use tokenizers::Tokenizer;

use semdex_core::{Error, Result};

/// Three equal-length sequences ready to become `[1, L]` input tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedInput {
    pub input_ids: Vec<i64>,
    /// 1 for real tokens, 0 for pad positions.
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TokenizedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Text → token ids, with pad, no-pad and count-only modes.
#[derive(Debug)]
pub struct TextTokenizer {
    inner: Tokenizer,
    pad_id: u32,
    /// Advisory upper bound from `tokenizer_config.json`, if declared.
    model_max_length: Option<usize>,
}

impl TextTokenizer {
    /// Load from a model directory holding `tokenizer.json`,
    /// `tokenizer_config.json` and `vocab.json` or `vocab.txt`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let manifest = model_dir.join("tokenizer.json");
        if !manifest.exists() {
            return Err(Error::InvalidModel(format!(
                "tokenizer manifest not found: {}",
                manifest.display()
            )));
        }
        let inner = Tokenizer::from_file(&manifest)
            .map_err(|e| Error::InvalidModel(format!("cannot load tokenizer: {e}")))?;

        let (pad_symbol, model_max_length) = read_tokenizer_config(model_dir)?;
        let vocab = read_vocab(model_dir)?;
        let pad_id = *vocab.get(&pad_symbol).ok_or_else(|| {
            Error::InvalidModel(format!(
                "pad token '{pad_symbol}' missing from vocabulary"
            ))
        })?;

        Ok(Self {
            inner,
            pad_id,
            model_max_length,
        })
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn model_max_length(&self) -> Option<usize> {
        self.model_max_length
    }

    /// Natural id sequence, no padding.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::Internal(format!("tokenization failed: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Token count of `text`, without allocating downstream tensors.
    pub fn count(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }

    /// Pad mode: truncate to `len`, pad the tail with the pad id and
    /// attention-mask 0. Output sequences are exactly `len` long.
    pub fn tokenize(&self, text: &str, len: usize) -> Result<TokenizedInput> {
        let ids = self.encode(text)?;
        let real = ids.len().min(len);

        let mut input_ids = Vec::with_capacity(len);
        let mut attention_mask = Vec::with_capacity(len);
        input_ids.extend(ids[..real].iter().map(|&id| id as i64));
        attention_mask.extend(std::iter::repeat(1i64).take(real));
        input_ids.extend(std::iter::repeat(self.pad_id as i64).take(len - real));
        attention_mask.extend(std::iter::repeat(0i64).take(len - real));

        Ok(TokenizedInput {
            input_ids,
            attention_mask,
            token_type_ids: vec![0; len],
        })
    }

    /// No-pad mode: natural length, attention mask all ones.
    pub fn tokenize_no_pad(&self, text: &str) -> Result<TokenizedInput> {
        let ids = self.encode(text)?;
        let len = ids.len();
        Ok(TokenizedInput {
            input_ids: ids.into_iter().map(|id| id as i64).collect(),
            attention_mask: vec![1; len],
            token_type_ids: vec![0; len],
        })
    }

    /// Inverse mapping, used to rebuild a truncated prefix as text for the
    /// remote embeddings API.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| Error::Internal(format!("decode failed: {e}")))
    }
}

/// Pull the pad-token symbol (string or `{content}` object form) and the
/// optional max length out of `tokenizer_config.json`.
fn read_tokenizer_config(model_dir: &Path) -> Result<(String, Option<usize>)> {
    let path = model_dir.join("tokenizer_config.json");
    let text = std::fs::read_to_string(&path).map_err(|_| {
        Error::InvalidModel(format!("tokenizer config not found: {}", path.display()))
    })?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::InvalidModel(format!("invalid tokenizer config: {e}")))?;

    let pad_symbol = match &value["pad_token"] {
        serde_json::Value::String(s) => s.clone(),
        other => other["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::InvalidModel("tokenizer config declares no pad_token".into())
            })?,
    };

    let model_max_length = value["model_max_length"]
        .as_u64()
        .map(|n| n as usize)
        // Some configs write a sentinel like 1e30 for "unbounded".
        .filter(|&n| n < 1_000_000);

    Ok((pad_symbol, model_max_length))
}

/// Symbol → id table from `vocab.json`, falling back to line-indexed
/// `vocab.txt`.
fn read_vocab(model_dir: &Path) -> Result<HashMap<String, u32>> {
    let json_path = model_dir.join("vocab.json");
    if json_path.exists() {
        let text = std::fs::read_to_string(&json_path)?;
        return serde_json::from_str(&text)
            .map_err(|e| Error::InvalidModel(format!("invalid vocab.json: {e}")));
    }

    let txt_path = model_dir.join("vocab.txt");
    if txt_path.exists() {
        let text = std::fs::read_to_string(&txt_path)?;
        return Ok(text
            .lines()
            .enumerate()
            .map(|(idx, line)| (line.to_string(), idx as u32))
            .collect());
    }

    Err(Error::InvalidModel(format!(
        "no vocab.json or vocab.txt in {}",
        model_dir.display()
    )))
}

/// Test fixtures shared with downstream crate tests.
#[doc(hidden)]
pub mod test_support {
    use std::path::Path;

    /// Write a minimal word-level tokenizer into `dir`: whitespace
    /// pre-tokenization, a tiny vocabulary, `[PAD]` at id 0, `[UNK]` at 1.
    pub fn write_word_level_tokenizer(dir: &Path) {
        let manifest = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "[PAD]": 0,
                    "[UNK]": 1,
                    "alert": 2,
                    "firewall": 3,
                    "dropped": 4,
                    "packet": 5,
                    "from": 6,
                    "subnet": 7,
                    "scan": 8
                },
                "unk_token": "[UNK]"
            }
        });
        std::fs::write(
            dir.join("tokenizer.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.join("tokenizer_config.json"),
            r#"{"pad_token": "[PAD]", "model_max_length": 512}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("vocab.json"),
            serde_json::to_string(&serde_json::json!({
                "[PAD]": 0, "[UNK]": 1, "alert": 2, "firewall": 3, "dropped": 4,
                "packet": 5, "from": 6, "subnet": 7, "scan": 8
            }))
            .unwrap(),
        )
        .unwrap();
    }
}
