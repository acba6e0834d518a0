//! Semdex — semantic indexing and retrieval service.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod bus;
mod handlers;

use auth::StaticKeyVerifier;
use bus::{MemoryBus, MessageBus};
use handlers::BusAdapter;

use semdex_index::PadLengthRegistry;
use semdex_infer::TextTokenizer;
use semdex_runtime::{IndexingOrchestrator, QueryOrchestrator};
use semdex_search::OpenSearchClient;

fn resolve_config_path() -> PathBuf {
    std::env::var("SEMDEX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = resolve_config_path();
    info!("loading configuration from {}", config_path.display());
    let config = Arc::new(
        semdex_core::SemdexConfig::load(&config_path)
            .map_err(|e| anyhow::anyhow!("configuration: {e}"))?,
    );

    // Process singletons: tokenizer, provider, engine client, registry.
    let tokenizer = Arc::new(
        TextTokenizer::load(&config.embedding_model_dir)
            .map_err(|e| anyhow::anyhow!("tokenizer: {e}"))?,
    );
    let provider = semdex_infer::create_provider(&config, tokenizer.clone())
        .map_err(|e| anyhow::anyhow!("embedding provider: {e}"))?;
    let engine: Arc<dyn semdex_search::SearchEngine> = Arc::new(
        OpenSearchClient::from_config(&config)
            .map_err(|e| anyhow::anyhow!("engine client: {e}"))?,
    );
    let registry = Arc::new(PadLengthRegistry::new(config.data_paths()?));

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

    // The production broker is wired behind the MessageBus trait by the
    // hosting platform; standalone runs get the in-process bus.
    let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new());
    info!("no external broker configured, using in-process bus");

    let encrypt_key = std::env::var("SEMDEX_ENCRYPT_KEY").unwrap_or_default();
    let adapter = Arc::new(BusAdapter::new(
        bus,
        Arc::new(StaticKeyVerifier),
        encrypt_key,
        indexer,
        querier,
    ));

    let handles = adapter
        .bind()
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind bus consumers: {e}"))?;
    info!("semdex ready, {} consumers bound", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}
