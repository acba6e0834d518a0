//! Configuration and data directory management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which embedding backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// In-process ONNX inference session.
    Local,
    /// Remote OpenAI-compatible embeddings API.
    Api,
}

/// Name of the third model input fed alongside `input_ids` and
/// `attention_mask`. Some checkpoints want positional indices, some want
/// segment ids; the two must never be conflated, so the binding is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraModelInput {
    PositionIds,
    TokenTypeIds,
}

/// Paths derived from the configured data root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory holding one subdirectory per logical index.
    pub root: PathBuf,
    /// Pad-length records (`{root}/index_config/{index}_padtokens.json`).
    pub index_config: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            index_config: root.join("index_config"),
            root,
        };
        std::fs::create_dir_all(&paths.index_config)?;
        Ok(paths)
    }

    /// Pad-length record file for one index.
    pub fn pad_tokens_file(&self, index: &str) -> PathBuf {
        self.index_config.join(format!("{index}_padtokens.json"))
    }
}

/// Top-level semdex configuration, loaded from a JSON file with environment
/// overrides for the secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemdexConfig {
    pub embedding_provider: EmbeddingProviderKind,
    /// Directory holding `model.onnx`, the tokenizer manifest, the tokenizer
    /// config and a vocabulary file.
    pub embedding_model_dir: PathBuf,
    /// Declared embedding dimension; must match every vector field mapping.
    pub embedding_model_vec_dim: usize,
    pub max_token_length_cap: usize,
    pub min_token_length_cap: usize,
    /// Intra-op thread count for the local inference session.
    #[serde(default = "default_llm_threads")]
    pub llm_threads: usize,
    #[serde(default)]
    pub embedding_api_url: String,
    #[serde(default)]
    pub embedding_api_model: String,
    /// Bearer token for the remote embeddings API.
    #[serde(default, rename = "llmHFKey")]
    pub llm_hf_key: String,
    pub open_search_url: String,
    pub open_search_user: String,
    pub open_search_key: String,
    #[serde(default)]
    pub open_search_default_index: String,
    pub data_dir: PathBuf,
    /// k-NN engine declared in index mappings; must agree with the deployed
    /// search engine build.
    #[serde(default = "default_knn_engine")]
    pub knn_engine: String,
    #[serde(default = "default_extra_input")]
    pub onnx_extra_input: ExtraModelInput,
    /// Per-model dequantization parameters for uint8 model outputs.
    #[serde(default = "default_quant_scale")]
    pub quant_scale: f32,
    #[serde(default)]
    pub quant_zero_point: i32,
}

fn default_llm_threads() -> usize {
    2
}

fn default_knn_engine() -> String {
    "nmslib".to_string()
}

fn default_extra_input() -> ExtraModelInput {
    ExtraModelInput::PositionIds
}

fn default_quant_scale() -> f32 {
    1.0
}

impl SemdexConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    /// for credentials (`SEMDEX_OPENSEARCH_KEY`, `SEMDEX_HF_KEY`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let mut config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config: {e}")))?;

        if let Ok(key) = std::env::var("SEMDEX_OPENSEARCH_KEY") {
            config.open_search_key = key;
        }
        if let Ok(key) = std::env::var("SEMDEX_HF_KEY") {
            config.llm_hf_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_model_vec_dim == 0 {
            return Err(Error::Config("embeddingModelVecDim must be > 0".into()));
        }
        if self.min_token_length_cap == 0
            || self.min_token_length_cap > self.max_token_length_cap
        {
            return Err(Error::Config(format!(
                "token length caps out of order: min={} max={}",
                self.min_token_length_cap, self.max_token_length_cap
            )));
        }
        if self.embedding_provider == EmbeddingProviderKind::Api
            && self.embedding_api_url.is_empty()
        {
            return Err(Error::Config(
                "embeddingApiUrl is required when embeddingProvider=api".into(),
            ));
        }
        Ok(())
    }

    pub fn data_paths(&self) -> std::io::Result<DataPaths> {
        DataPaths::new(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SemdexConfig {
        serde_json::from_value(serde_json::json!({
            "embeddingProvider": "local",
            "embeddingModelDir": "/models/embed",
            "embeddingModelVecDim": 128,
            "maxTokenLengthCap": 512,
            "minTokenLengthCap": 64,
            "openSearchUrl": "https://localhost:9200",
            "openSearchUser": "admin",
            "openSearchKey": "admin",
            "dataDir": "/data",
        }))
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = base_config();
        assert_eq!(config.llm_threads, 2);
        assert_eq!(config.knn_engine, "nmslib");
        assert_eq!(config.onnx_extra_input, ExtraModelInput::PositionIds);
        assert_eq!(config.quant_scale, 1.0);
        assert_eq!(config.quant_zero_point, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_inverted_caps() {
        let mut config = base_config();
        config.min_token_length_cap = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_api_requires_url() {
        let mut config = base_config();
        config.embedding_provider = EmbeddingProviderKind::Api;
        assert!(config.validate().is_err());
        config.embedding_api_url = "https://embed.example".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pad_tokens_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        assert!(paths.index_config.is_dir());
        assert_eq!(
            paths.pad_tokens_file("documents"),
            dir.path().join("index_config/documents_padtokens.json")
        );
    }
}
