//! Indexing orchestration: request → strategy → padding → engine writes.
//!
//! Per-item failures never abort a run; they are collected and reported in
//! the aggregate result. Infrastructure failures (engine unreachable) abort
//! the current request only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use semdex_core::{
    CreateIndexRequest, CreateSnapshotRequest, Error, ResultObj, SemdexConfig,
};
use semdex_index::{
    estimate_padding, strategies, IndexStrategy, PadLengthRecord, PadLengthRegistry,
};
use semdex_infer::{EmbeddingProvider, TextTokenizer};
use semdex_search::SearchEngine;

pub struct IndexingOrchestrator {
    engine: Arc<dyn SearchEngine>,
    provider: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<TextTokenizer>,
    registry: Arc<PadLengthRegistry>,
    strategies: Vec<Arc<dyn IndexStrategy>>,
    config: Arc<SemdexConfig>,
}

/// Outcome counters for one index run.
#[derive(Debug, Clone, Default)]
struct RunStats {
    indexed: usize,
    skipped: usize,
    failures: Vec<String>,
}

impl RunStats {
    fn merge(&mut self, other: RunStats) {
        self.indexed += other.indexed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }

    fn into_result(self, context: &str) -> ResultObj {
        let summary = format!(
            "{context}: {} indexed, {} skipped, {} failed",
            self.indexed,
            self.skipped,
            self.failures.len()
        );
        if self.failures.is_empty() {
            ResultObj::ok(summary)
        } else {
            ResultObj::err(format!("{summary}; failures: {}", self.failures.join("; ")))
        }
    }
}

impl IndexingOrchestrator {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        provider: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<TextTokenizer>,
        registry: Arc<PadLengthRegistry>,
        config: Arc<SemdexConfig>,
    ) -> Self {
        Self {
            engine,
            provider,
            tokenizer,
            registry,
            strategies: strategies(),
            config,
        }
    }

    fn strategy_for(&self, index: &str) -> Option<Arc<dyn IndexStrategy>> {
        self.strategies.iter().find(|s| s.can_handle(index)).cloned()
    }

    /// Entry point for `createIndex` requests.
    pub async fn create_index(&self, request: &CreateIndexRequest) -> ResultObj {
        if request.create_from_json_data_dir {
            return self.bulk_index(request.recreate_index).await;
        }
        self.index_single(request).await
    }

    /// Walk `{dataDir}/{index}/*.json` for every known index directory.
    pub async fn bulk_index(&self, recreate: bool) -> ResultObj {
        let index_dirs = match self.discover_index_dirs() {
            Ok(dirs) => dirs,
            Err(e) => return ResultObj::err(format!("cannot read data dir: {e}")),
        };

        let mut stats = RunStats::default();
        for dir in index_dirs {
            let index = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let files = match discover_json_files(&dir) {
                Ok(files) if files.is_empty() => {
                    debug!("no json files under {}, skipping", dir.display());
                    continue;
                }
                Ok(files) => files,
                Err(e) => {
                    stats.failures.push(format!("{index}: {e}"));
                    continue;
                }
            };

            let Some(strategy) = self.strategy_for(&index) else {
                warn!("no strategy handles index '{index}', skipping");
                continue;
            };

            match self
                .index_directory(strategy.as_ref(), &index, &files, recreate)
                .await
            {
                Ok(dir_stats) => stats.merge(dir_stats),
                Err(e) => {
                    // Infrastructure failure: abort the request, report what ran.
                    return ResultObj::err(format!(
                        "bulk index aborted at '{index}': {e}; partial: {} indexed",
                        stats.indexed
                    ));
                }
            }
        }

        stats.into_result("bulk index")
    }

    /// Index one explicit JSON file. The pad length must already be known.
    pub async fn index_single(&self, request: &CreateIndexRequest) -> ResultObj {
        if request.index_name.is_empty() {
            return ResultObj::err(Error::InvalidRequest("indexName is empty".into()).to_string());
        }
        let Some(file) = request.json_file.as_deref().filter(|f| !f.is_empty()) else {
            return ResultObj::err(
                Error::InvalidRequest("jsonFile is required".into()).to_string(),
            );
        };
        let Some(strategy) = self.strategy_for(&request.index_name) else {
            return ResultObj::err(format!(
                "no strategy handles index '{}'",
                request.index_name
            ));
        };

        let Some(record) = self.registry.get(&request.index_name) else {
            return ResultObj::err(
                Error::PadLengthUnknown(request.index_name.clone()).to_string(),
            );
        };

        if let Err(e) = self
            .ensure_index(
                strategy.as_ref(),
                &request.index_name,
                request.recreate_index,
                request.json_mapping.as_ref(),
            )
            .await
        {
            return ResultObj::err(format!("cannot ensure index: {e}"));
        }

        match self
            .index_file(
                strategy.as_ref(),
                &request.index_name,
                Path::new(file),
                record.pad_to_tokens,
            )
            .await
        {
            Ok(stats) => stats.into_result(&format!("index '{}'", request.index_name)),
            Err(e) => ResultObj::err(format!("index '{}' aborted: {e}", request.index_name)),
        }
    }

    /// Snapshot pass-through for the bus surface.
    pub async fn create_snapshot(&self, request: &CreateSnapshotRequest) -> ResultObj {
        if request.snapshot_repo.is_empty() || request.snapshot_name.is_empty() {
            return ResultObj::err(
                Error::InvalidRequest("snapshotRepo and snapshotName are required".into())
                    .to_string(),
            );
        }
        match self
            .engine
            .snapshot_create(
                &request.snapshot_repo,
                &request.snapshot_name,
                &request.indices,
            )
            .await
        {
            Ok(()) => ResultObj::ok(format!(
                "snapshot '{}/{}' created",
                request.snapshot_repo, request.snapshot_name
            )),
            Err(e) => ResultObj::err(format!("snapshot failed: {e}")),
        }
    }

    async fn index_directory(
        &self,
        strategy: &dyn IndexStrategy,
        index: &str,
        files: &[PathBuf],
        recreate: bool,
    ) -> semdex_core::Result<RunStats> {
        let pad_to_tokens = self.resolve_pad_length(strategy, index, files)?;
        self.ensure_index(strategy, index, recreate, None).await?;

        let mut stats = RunStats::default();
        for file in files {
            let file_stats = self
                .index_file(strategy, index, file, pad_to_tokens)
                .await?;
            stats.merge(file_stats);
        }

        info!(
            "index '{index}': {} indexed, {} skipped, {} failed",
            stats.indexed,
            stats.skipped,
            stats.failures.len()
        );
        Ok(stats)
    }

    /// Reuse the registered pad length, or estimate one and persist it.
    fn resolve_pad_length(
        &self,
        strategy: &dyn IndexStrategy,
        index: &str,
        files: &[PathBuf],
    ) -> semdex_core::Result<usize> {
        if let Some(record) = self.registry.get(index) {
            debug!(
                "index '{index}' uses registered pad length {}",
                record.pad_to_tokens
            );
            return Ok(record.pad_to_tokens);
        }

        let estimate = estimate_padding(
            strategy,
            files,
            &self.tokenizer,
            self.config.max_token_length_cap,
            self.config.min_token_length_cap,
        )?;
        self.registry.put(
            index,
            PadLengthRecord {
                pad_to_tokens: estimate.pad_to_tokens,
                actual_max_tokens: estimate.observed_max,
            },
        )?;
        info!(
            "index '{index}' pad length estimated: padToTokens={}, observed max={}",
            estimate.pad_to_tokens, estimate.observed_max
        );
        Ok(estimate.pad_to_tokens)
    }

    /// Create the index if needed; on `recreate`, drop it first.
    async fn ensure_index(
        &self,
        strategy: &dyn IndexStrategy,
        index: &str,
        recreate: bool,
        mapping_override: Option<&serde_json::Value>,
    ) -> semdex_core::Result<()> {
        let mapping = match mapping_override {
            Some(mapping) => mapping.clone(),
            None => strategy.engine_mapping(
                self.config.embedding_model_vec_dim,
                &self.config.knn_engine,
            ),
        };

        if recreate {
            self.engine.delete_index(index).await?;
            self.engine.create_index(index, &mapping).await?;
            return Ok(());
        }

        if !self.engine.index_exists(index).await? {
            self.engine.create_index(index, &mapping).await?;
        }
        Ok(())
    }

    /// Process one file: deserialize, embed, write each new item.
    ///
    /// Returns `Err` only for infrastructure failures; item-level problems
    /// land in the stats.
    async fn index_file(
        &self,
        strategy: &dyn IndexStrategy,
        index: &str,
        file: &Path,
        pad_to_tokens: usize,
    ) -> semdex_core::Result<RunStats> {
        let json = std::fs::read_to_string(file)?;
        let items = strategy.deserialize(&json);
        if items.is_empty() {
            warn!("{} contained no parseable items", file.display());
        }

        let mut stats = RunStats::default();
        for mut item in items {
            if let Err(e) = strategy
                .ensure_embeddings(&mut item, self.provider.as_ref(), pad_to_tokens)
                .await
            {
                stats
                    .failures
                    .push(format!("{}: {e}", strategy.document_id(&item)));
                continue;
            }

            let id = strategy.document_id(&item);
            match self.engine.doc_exists(index, &id).await {
                Ok(true) => {
                    stats.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e @ Error::Http(_)) => return Err(e),
                Err(e) => {
                    stats.failures.push(format!("{id}: {e}"));
                    continue;
                }
            }

            let body = strategy.index_document(&item);
            match self.engine.index_doc(index, &id, &body).await {
                Ok(()) => stats.indexed += 1,
                Err(e @ Error::Http(_)) => return Err(e),
                Err(e) => stats.failures.push(format!("{id}: {e}")),
            }
        }

        Ok(stats)
    }

    fn discover_index_dirs(&self) -> semdex_core::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if entry.file_name() == "index_config" {
                continue;
            }
            dirs.push(path);
        }
        dirs.sort();
        Ok(dirs)
    }
}

fn discover_json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}
