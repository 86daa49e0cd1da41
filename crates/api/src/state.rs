//! Shared application state for the Axum API server.

use chainledger_common::config::AppConfig;
use chainledger_indexer::ProgressMonitor;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
///
/// The API is a read-only surface over the indexer's own stores — it never
/// writes, so it isn't subject to the single-writer lock the indexer binary
/// holds.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub progress: ProgressMonitor,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, progress: ProgressMonitor) -> Self {
        Self { pool, config, progress }
    }
}
