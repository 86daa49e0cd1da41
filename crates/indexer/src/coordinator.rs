//! Indexer Coordinator: wires the Lock Manager, decoder, repositories,
//! Fetcher, and Dispatcher together, then runs them as independent tasks
//! until either one exits or the process receives a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use chainledger_common::config::AppConfig;
use chainledger_common::rpc::ChainRpc;
use chainledger_decoder::DecoderRegistry;
use chainledger_repo::{HandlerRegistry, RepositoryRegistry};
use chainledger_store::{BlockHashStore, CursorStore, EventLogStore, LockManager};
use sqlx::PgPool;

use crate::dispatcher::Dispatcher;
use crate::fetcher::Fetcher;
use crate::progress::ProgressMonitor;

const LOCK_PURPOSE: &str = "indexer-writer";

pub struct IndexerCoordinator {
    config: AppConfig,
    pool: PgPool,
    rpc: Arc<dyn ChainRpc>,
    decoder: Arc<DecoderRegistry>,
    handlers: HandlerRegistry,
}

impl IndexerCoordinator {
    pub fn new(
        config: AppConfig,
        pool: PgPool,
        rpc: Arc<dyn ChainRpc>,
        decoder: DecoderRegistry,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            config,
            pool,
            rpc,
            decoder: Arc::new(decoder),
            handlers,
        }
    }

    /// Acquire the single-writer lock, initialize the cursor if absent, and
    /// run the Fetcher, Dispatcher, and Progress Monitor until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        self.decoder.bind(self.config.schema.clone(), self.config.chain_id)?;

        let dedicated = chainledger_common::db::connect_dedicated(&self.config.database_url).await?;
        let _lock = LockManager::acquire(dedicated, &self.config.schema, self.config.chain_id, LOCK_PURPOSE).await?;

        let cursor_store = CursorStore::new(self.config.schema.clone());
        cursor_store
            .initialize_if_absent(&self.pool, self.config.chain_id, self.config.start_block)
            .await?;

        let fetcher = Fetcher::new(
            Arc::clone(&self.rpc),
            self.pool.clone(),
            self.config.chain_id,
            Arc::clone(&self.decoder),
            cursor_store.clone(),
            BlockHashStore::new(self.config.schema.clone()),
            EventLogStore::new(self.config.schema.clone()),
            self.config.confirmations,
            self.config.fetch_window,
            self.config.reorg_window,
            Duration::from_millis(self.config.poll_interval_ms),
        );

        let repos = RepositoryRegistry::new(self.config.schema.clone());
        let dispatcher = Dispatcher::new(
            self.pool.clone(),
            self.config.chain_id,
            EventLogStore::new(self.config.schema.clone()),
            self.handlers,
            repos,
            Arc::clone(&self.rpc),
            self.config.dispatch_batch_size,
        );

        let monitor = ProgressMonitor::new(
            self.pool.clone(),
            self.config.chain_id,
            cursor_store,
            Arc::clone(&self.rpc),
        );

        tokio::select! {
            result = fetcher.run() => {
                result.map_err(|e| anyhow::anyhow!("fetcher exited: {e}"))?;
            }
            result = dispatcher.run() => {
                result.map_err(|e| anyhow::anyhow!("dispatcher exited: {e}"))?;
            }
            _ = monitor.run() => {
                unreachable!("progress monitor never returns on its own");
            }
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received");
            }
        }

        tracing::info!("shutdown_complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
