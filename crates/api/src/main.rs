//! chainledger API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chainledger_common::config::AppConfig;
use chainledger_common::db;
use chainledger_common::rpc::alloy_rpc::AlloyRpc;
use chainledger_indexer::ProgressMonitor;
use chainledger_store::CursorStore;

use chainledger_api::routes::create_router;
use chainledger_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chainledger_api=info,tower_http=info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(chain_id = config.chain_id, schema = %config.schema, "chainledger api starting");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    let rpc = Arc::new(AlloyRpc::connect_http(
        &config.chain_rpc_url,
        Duration::from_secs(config.rpc_timeout_secs),
    )?);

    let progress = ProgressMonitor::new(pool.clone(), config.chain_id, CursorStore::new(config.schema.clone()), rpc);
    let state = AppState::new(pool, config, progress);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!(%addr, "api server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
