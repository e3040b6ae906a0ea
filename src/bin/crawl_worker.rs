//! Worker process: consumes queued crawl requests until terminated.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crawldex::config::{EnvConfig, WorkerSettings};
use crawldex::crawler::HttpCrawlClient;
use crawldex::embedding::{HttpEmbeddingClient, RetryPolicy};
use crawldex::queue::{JobQueue, QueuePolicy};
use crawldex::status::StatusStore;
use crawldex::types::IngestError;
use crawldex::vector_store::HttpVectorStore;
use crawldex::worker::IngestionWorker;
use crawldex::db;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!(%err, "worker exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), IngestError> {
    let config = EnvConfig::load()?;
    let settings = WorkerSettings::default();

    let pool = db::connect(&config.database_url).await?;
    let queue = JobQueue::new(pool.clone(), QueuePolicy::default());
    let status = StatusStore::new(pool);

    let crawler = HttpCrawlClient::new(&config.crawler_url, config.crawler_api_key)?;
    let embedder = HttpEmbeddingClient::new(
        &config.embedding_url,
        config.embedding_api_key,
        settings.embedding_dim,
        RetryPolicy::default(),
    )?;
    let vectors = HttpVectorStore::new(&config.vector_index_url, config.vector_api_key)?;

    let worker = IngestionWorker::new(
        Arc::new(crawler),
        Arc::new(embedder),
        Arc::new(vectors),
        queue,
        status,
        settings,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received, finishing in-flight job");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
