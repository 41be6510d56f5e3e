//! CLI command implementations: thin wiring over `canopy-indexer`'s
//! `Coordinator`, `canopy-watcher`'s `WatcherService`, and `canopy-ai`'s
//! embedding/search pipeline. No wire protocol or UI surface — output is a
//! plain text summary to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use canopy_ai::embedding::EmbeddingOrchestrator;
use canopy_ai::providers::local::LocalEmbeddingProvider;
use canopy_ai::rerank::RerankConfig;
use canopy_ai::search::{self, SearchConfig};
use canopy_core::storage::ComponentRepository;
use canopy_core::{EngineConfig, InMemoryStorage};
use canopy_watcher::WatcherService;

pub async fn index(root: PathBuf) -> Result<()> {
    let config = EngineConfig::load(&root)?;
    let storage = InMemoryStorage::new();
    let indexer = canopy_watcher::IncrementalIndexer::new(root.clone(), config);
    let summary = indexer.run_full_index(&storage, &storage)?;

    tracing::info!(
        files = summary.files_indexed,
        components = summary.components,
        relationships = summary.relationships,
        resolver_passes = summary.resolver_passes,
        errors = summary.file_errors,
        "indexed {}",
        root.display()
    );
    Ok(())
}

pub async fn watch(root: PathBuf) -> Result<()> {
    let config = EngineConfig::load(&root)?;
    let storage = Arc::new(InMemoryStorage::new());
    let service = WatcherService::new(root.clone(), config, storage);

    let mut state = service.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            tracing::info!(state = ?*state.borrow(), "watcher state changed");
        }
    });

    let cancel = service.cancel_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested, draining in-flight batch");
        cancel.store(true, std::sync::atomic::Ordering::Relaxed);
    });

    service.run().await
}

pub async fn embed(root: PathBuf) -> Result<()> {
    let config = EngineConfig::load(&root)?;
    let storage = InMemoryStorage::new();
    let indexer = canopy_watcher::IncrementalIndexer::new(root.clone(), config.clone());
    indexer.run_full_index(&storage, &storage)?;

    let provider = LocalEmbeddingProvider::new();
    let orchestrator = EmbeddingOrchestrator::new(provider).with_batch_size(config.embedding_batch_size);
    let outcome = orchestrator.embed_components(&storage.get_all(), &storage).await;

    tracing::info!(
        embedded = outcome.embedded,
        skipped_fresh = outcome.skipped_fresh,
        failed = outcome.failed.len(),
        "embedding pass complete"
    );
    Ok(())
}

pub async fn search(root: PathBuf, query: String, k: usize) -> Result<()> {
    let config = EngineConfig::load(&root)?;
    let storage = InMemoryStorage::new();
    let indexer = canopy_watcher::IncrementalIndexer::new(root.clone(), config.clone());
    indexer.run_full_index(&storage, &storage)?;

    let provider = LocalEmbeddingProvider::new();
    let orchestrator = EmbeddingOrchestrator::new(LocalEmbeddingProvider::new()).with_batch_size(config.embedding_batch_size);
    let _ = orchestrator.embed_components(&storage.get_all(), &storage).await;

    let search_config = SearchConfig::new(k, RerankConfig::for_components());
    let results = search::search(&query, &search_config, &provider, &storage, &storage, &storage).await?;

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. {:.3}  {}  ({}:{})",
            rank + 1,
            result.final_score,
            result.component.name,
            result.component.file_path,
            result.component.location.start_line
        );
    }
    if results.is_empty() {
        println!("no matches");
    }
    Ok(())
}

pub fn clear(root: PathBuf) -> Result<()> {
    canopy_core::cache::clear_cache(&root)?;
    tracing::info!("cleared cache for {}", root.display());
    Ok(())
}
