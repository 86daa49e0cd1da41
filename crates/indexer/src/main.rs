use std::sync::Arc;
use std::time::Duration;

use chainledger_common::config::AppConfig;
use chainledger_common::db;
use chainledger_common::rpc::alloy_rpc::AlloyRpc;
use chainledger_decoder::DecoderRegistry;
use chainledger_indexer::IndexerCoordinator;
use chainledger_repo::HandlerRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| "chainledger_indexer=info".into()),
        )
        .json()
        .init();

    tracing::info!(chain_id = config.chain_id, schema = %config.schema, "chainledger indexer starting");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    let rpc = Arc::new(AlloyRpc::connect_http(
        &config.chain_rpc_url,
        Duration::from_secs(config.rpc_timeout_secs),
    )?);

    // Contract addresses, ABIs, and decode functions are an external
    // chain-configuration catalog — wiring them in is a deployment concern,
    // not something this binary owns. A real deployment replaces this with
    // its own registrations before constructing the decoder.
    let decoder = DecoderRegistry::new(vec![]);
    let handlers = HandlerRegistry::new();

    let coordinator = IndexerCoordinator::new(config, pool, rpc, decoder, handlers);
    coordinator.run().await
}
