//! Bus endpoint binding: one consumer task per logical endpoint, manual
//! ack on handler success.
//!
//! Decode failures are logged and acked, never retried. The auth gate runs
//! before any handler; a rejected key still produces a ResultObj reply so
//! the caller learns why nothing happened. Only a handler that dies leaves
//! its delivery unacknowledged.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use semdex_core::{
    CreateIndexRequest, CreateSnapshotRequest, Error, QueryIndexRequest, ResultObj,
};
use semdex_runtime::{IndexingOrchestrator, QueryOrchestrator};

use crate::auth::KeyVerifier;
use crate::bus::{Delivery, MessageBus};

pub const CREATE_INDEX: &str = "createIndex";
pub const QUERY_INDEX: &str = "queryIndex";
pub const CREATE_SNAPSHOT: &str = "createSnapshot";

pub struct BusAdapter {
    bus: Arc<dyn MessageBus>,
    verifier: Arc<dyn KeyVerifier>,
    encrypt_key: String,
    indexer: Arc<IndexingOrchestrator>,
    querier: Arc<QueryOrchestrator>,
}

impl BusAdapter {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        verifier: Arc<dyn KeyVerifier>,
        encrypt_key: String,
        indexer: Arc<IndexingOrchestrator>,
        querier: Arc<QueryOrchestrator>,
    ) -> Self {
        Self {
            bus,
            verifier,
            encrypt_key,
            indexer,
            querier,
        }
    }

    /// Bind all three endpoints. Each returned task owns one consumer and
    /// processes deliveries strictly one at a time.
    pub async fn bind(self: Arc<Self>) -> semdex_core::Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(3);

        let mut create_rx = self.bus.consume(CREATE_INDEX).await?;
        let adapter = self.clone();
        handles.push(tokio::spawn(async move {
            info!("consumer bound: {CREATE_INDEX}");
            while let Some(delivery) = create_rx.recv().await {
                adapter.handle_create_index(delivery).await;
            }
        }));

        let mut query_rx = self.bus.consume(QUERY_INDEX).await?;
        let adapter = self.clone();
        handles.push(tokio::spawn(async move {
            info!("consumer bound: {QUERY_INDEX}");
            while let Some(delivery) = query_rx.recv().await {
                adapter.handle_query_index(delivery).await;
            }
        }));

        let mut snapshot_rx = self.bus.consume(CREATE_SNAPSHOT).await?;
        let adapter = self.clone();
        handles.push(tokio::spawn(async move {
            info!("consumer bound: {CREATE_SNAPSHOT}");
            while let Some(delivery) = snapshot_rx.recv().await {
                adapter.handle_create_snapshot(delivery).await;
            }
        }));

        Ok(handles)
    }

    fn authorized(&self, auth_key: &str, app_id: &str) -> bool {
        self.verifier.verify(&self.encrypt_key, auth_key, app_id)
    }

    async fn publish_json(&self, endpoint: &str, value: &serde_json::Value) {
        match serde_json::to_vec(value) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(endpoint, payload).await {
                    error!("cannot publish to '{endpoint}': {e}");
                }
            }
            Err(e) => error!("cannot serialize reply for '{endpoint}': {e}"),
        }
    }

    async fn handle_create_index(&self, delivery: Delivery) {
        let request: CreateIndexRequest = match serde_json::from_slice(&delivery.payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("undecodable {CREATE_INDEX} message: {e}");
                delivery.ack();
                return;
            }
        };

        let reply_endpoint = format!("createIndexResult{}", request.app_id);
        let result = if self.authorized(&request.auth_key, &request.app_id) {
            self.indexer.create_index(&request).await
        } else {
            warn!("unauthorized {CREATE_INDEX} from '{}'", request.app_id);
            ResultObj::err(Error::Unauthorized(request.app_id.clone()).to_string())
        };

        self.publish_json(&reply_endpoint, &json!(result)).await;
        delivery.ack();
    }

    async fn handle_query_index(&self, delivery: Delivery) {
        let request: QueryIndexRequest = match serde_json::from_slice(&delivery.payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("undecodable {QUERY_INDEX} message: {e}");
                delivery.ack();
                return;
            }
        };

        let reply_endpoint = format!("queryIndexResult{}", request.app_id);
        let reply = if self.authorized(&request.auth_key, &request.app_id) {
            self.querier.query(&request).await
        } else {
            warn!("unauthorized {QUERY_INDEX} from '{}'", request.app_id);
            semdex_core::QueryIndexReply {
                success: false,
                message: Error::Unauthorized(request.app_id.clone()).to_string(),
                query_results: Vec::new(),
            }
        };

        self.publish_json(&reply_endpoint, &json!(reply)).await;
        delivery.ack();
    }

    async fn handle_create_snapshot(&self, delivery: Delivery) {
        let request: CreateSnapshotRequest = match serde_json::from_slice(&delivery.payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("undecodable {CREATE_SNAPSHOT} message: {e}");
                delivery.ack();
                return;
            }
        };

        let reply_endpoint = format!("createSnapshotResult{}", request.app_id);
        let result = if self.authorized(&request.auth_key, &request.app_id) {
            self.indexer.create_snapshot(&request).await
        } else {
            warn!("unauthorized {CREATE_SNAPSHOT} from '{}'", request.app_id);
            ResultObj::err(Error::Unauthorized(request.app_id.clone()).to_string())
        };

        self.publish_json(&reply_endpoint, &json!(result)).await;
        delivery.ack();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use semdex_core::{Result, SemdexConfig};
    use semdex_index::PadLengthRegistry;
    use semdex_infer::tokenizer::test_support::write_word_level_tokenizer;
    use semdex_infer::{HashProvider, TextTokenizer};
    use semdex_search::{DeleteOutcome, SearchEngine, SearchHit};

    use crate::auth::StaticKeyVerifier;
    use crate::bus::MemoryBus;

    /// Engine stub: nothing exists, every write succeeds, every search is
    /// empty.
    struct NullEngine;

    #[async_trait]
    impl SearchEngine for NullEngine {
        async fn index_exists(&self, _index: &str) -> Result<bool> {
            Ok(false)
        }
        async fn create_index(&self, _index: &str, _mapping: &Value) -> Result<()> {
            Ok(())
        }
        async fn delete_index(&self, _index: &str) -> Result<DeleteOutcome> {
            Ok(DeleteOutcome::Absent)
        }
        async fn doc_exists(&self, _index: &str, _id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn index_doc(&self, _index: &str, _id: &str, _body: &Value) -> Result<()> {
            Ok(())
        }
        async fn knn_search(
            &self,
            _index: &str,
            _field: &str,
            _vector: &[f32],
            _k: usize,
        ) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
        async fn multi_field_knn_search(
            &self,
            _index: &str,
            _weights: &[(String, f32)],
            _vector: &[f32],
            _k_per_field: usize,
        ) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
        async fn snapshot_create(
            &self,
            _repo: &str,
            _name: &str,
            _indices: &[String],
        ) -> Result<()> {
            Ok(())
        }
        async fn snapshot_restore(
            &self,
            _repo: &str,
            _name: &str,
            _indices: &[String],
        ) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        bus: Arc<MemoryBus>,
        _handles: Vec<JoinHandle<()>>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("model");
        std::fs::create_dir_all(&model_dir).unwrap();
        write_word_level_tokenizer(&model_dir);
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();

        let config: Arc<SemdexConfig> = Arc::new(
            serde_json::from_value(serde_json::json!({
                "embeddingProvider": "local",
                "embeddingModelDir": model_dir,
                "embeddingModelVecDim": 16,
                "maxTokenLengthCap": 512,
                "minTokenLengthCap": 64,
                "openSearchUrl": "https://localhost:9200",
                "openSearchUser": "admin",
                "openSearchKey": "admin",
                "dataDir": data_dir,
            }))
            .unwrap(),
        );

        let engine: Arc<dyn SearchEngine> = Arc::new(NullEngine);
        let provider = Arc::new(HashProvider::new(16));
        let tokenizer = Arc::new(TextTokenizer::load(&config.embedding_model_dir).unwrap());
        let registry = Arc::new(PadLengthRegistry::new(config.data_paths().unwrap()));

        let indexer = Arc::new(IndexingOrchestrator::new(
            engine.clone(),
            provider.clone(),
            tokenizer,
            registry.clone(),
            config.clone(),
        ));
        let querier = Arc::new(QueryOrchestrator::new(
            engine,
            provider,
            registry,
            &config,
        ));

        let bus = Arc::new(MemoryBus::new());
        let adapter = Arc::new(BusAdapter::new(
            bus.clone(),
            Arc::new(StaticKeyVerifier),
            "s3cret".to_string(),
            indexer,
            querier,
        ));
        let handles = adapter.bind().await.unwrap();

        Harness {
            bus,
            _handles: handles,
            _dir: dir,
        }
    }

    async fn wait_for_reply(bus: &MemoryBus, endpoint: &str) -> Value {
        for _ in 0..100 {
            let published = bus.published(endpoint);
            if let Some(payload) = published.first() {
                return serde_json::from_slice(payload).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no reply on '{endpoint}'");
    }

    #[tokio::test]
    async fn test_unauthorized_request_is_rejected_and_acked() {
        let h = harness().await;
        let request = serde_json::json!({
            "indexName": "documents",
            "recreateIndex": false,
            "createFromJsonDataDir": true,
            "appId": "nm-01",
            "authKey": "wrong-key",
        });
        h.bus
            .send(CREATE_INDEX, serde_json::to_vec(&request).unwrap())
            .unwrap();

        let reply = wait_for_reply(&h.bus, "createIndexResultnm-01").await;
        assert_eq!(reply["success"], false);
        assert!(reply["message"].as_str().unwrap().starts_with("Unauthorized"));
        assert_eq!(h.bus.ack_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_message_is_acked_without_reply() {
        let h = harness().await;
        h.bus
            .send(CREATE_INDEX, b"this is not json".to_vec())
            .unwrap();

        for _ in 0..100 {
            if h.bus.ack_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.bus.ack_count(), 1);
        assert!(h.bus.published("createIndexResult").is_empty());
    }

    #[tokio::test]
    async fn test_authorized_bulk_index_replies_on_app_endpoint() {
        let h = harness().await;
        let request = serde_json::json!({
            "indexName": "",
            "recreateIndex": false,
            "createFromJsonDataDir": true,
            "appId": "nm-02",
            "authKey": "s3cret",
        });
        h.bus
            .send(CREATE_INDEX, serde_json::to_vec(&request).unwrap())
            .unwrap();

        let reply = wait_for_reply(&h.bus, "createIndexResultnm-02").await;
        // Empty data dir: nothing indexed, nothing failed.
        assert_eq!(reply["success"], true);
        assert_eq!(h.bus.ack_count(), 1);
    }

    #[tokio::test]
    async fn test_query_for_unknown_index_reports_failure() {
        let h = harness().await;
        let request = serde_json::json!({
            "indexName": "no-such-index",
            "queryText": "anything",
            "appId": "nm-03",
            "authKey": "s3cret",
        });
        h.bus
            .send(QUERY_INDEX, serde_json::to_vec(&request).unwrap())
            .unwrap();

        let reply = wait_for_reply(&h.bus, "queryIndexResultnm-03").await;
        assert_eq!(reply["success"], false);
        assert!(reply["queryResults"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_request_round_trip() {
        let h = harness().await;
        let request = serde_json::json!({
            "snapshotRepo": "nightly",
            "snapshotName": "snap-9",
            "indices": ["documents"],
            "appId": "nm-04",
            "authKey": "s3cret",
        });
        h.bus
            .send(CREATE_SNAPSHOT, serde_json::to_vec(&request).unwrap())
            .unwrap();

        let reply = wait_for_reply(&h.bus, "createSnapshotResultnm-04").await;
        assert_eq!(reply["success"], true);
    }
}
