//! Per-index pad-length store: an in-memory map in front of one JSON file
//! per index under `{dataDir}/index_config/`.
//!
//! The file is the source of truth across restarts. A record is written once
//! when an index is first estimated and is read-only afterwards, unless the
//! file is deleted and the index re-estimated.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use semdex_core::{DataPaths, Result};

/// Pad length persisted for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadLengthRecord {
    /// Length every future embedding call against this index pads to.
    pub pad_to_tokens: usize,
    /// Largest token count observed during estimation.
    pub actual_max_tokens: usize,
}

pub struct PadLengthRegistry {
    paths: DataPaths,
    map: RwLock<HashMap<String, PadLengthRecord>>,
}

impl PadLengthRegistry {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Lookup order: memory, then the on-disk record (cached on hit).
    pub fn get(&self, index: &str) -> Option<PadLengthRecord> {
        if let Some(record) = self.map.read().get(index) {
            return Some(*record);
        }
        let record = self.read_file(index)?;
        self.map.write().insert(index.to_string(), record);
        Some(record)
    }

    /// Persist a record to both the map and the file.
    pub fn put(&self, index: &str, record: PadLengthRecord) -> Result<()> {
        let path = self.paths.pad_tokens_file(index);
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        self.map.write().insert(index.to_string(), record);
        debug!(
            "pad length for '{index}' persisted: padToTokens={}, actualMaxTokens={}",
            record.pad_to_tokens, record.actual_max_tokens
        );
        Ok(())
    }

    /// Drop the cached entry and answer from the file alone. After the file
    /// is deleted, this is how a stale memory entry is prevented from
    /// resurrecting the record.
    pub fn reload(&self, index: &str) -> Option<PadLengthRecord> {
        self.map.write().remove(index);
        self.get(index)
    }

    fn read_file(&self, index: &str) -> Option<PadLengthRecord> {
        let path = self.paths.pad_tokens_file(index);
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }
}
