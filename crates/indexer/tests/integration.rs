//! Exercises the Fetcher's cold-start and reorg-rewind paths against a
//! `MockRpc`, and the Dispatcher's success/failure/no-handler paths, all
//! against a real Postgres schema.
//!
//! Requires `DATABASE_URL`. Run explicitly:
//! `cargo test -p chainledger-indexer --test integration -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chainledger_common::error::AppError;
use chainledger_common::rpc::mock::MockRpc;
use chainledger_common::rpc::BlockHeader;
use chainledger_common::schema::SchemaName;
use chainledger_common::types::{DecodedEvent, EventPointer, EventRecord};
use chainledger_decoder::DecoderRegistry;
use chainledger_indexer::{Dispatcher, Fetcher, ProgressMonitor};
use chainledger_repo::{Handler, HandlerContext, HandlerRegistry, RepositoryRegistry};
use chainledger_store::{BlockHashStore, CursorStore, EventLogStore};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};

const CHAIN_ID: u64 = 14;

fn schema() -> SchemaName {
    SchemaName::parse("indexer_itest").unwrap()
}

async fn setup(pool: &PgPool) {
    let schema = schema();
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema.as_str()))
        .execute(pool)
        .await
        .unwrap();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            chain_id BIGINT PRIMARY KEY,
            fetched_to_block BIGINT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )",
        schema.table("_cursor")
    ))
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            chain_id BIGINT NOT NULL,
            block_number BIGINT NOT NULL,
            block_hash TEXT NOT NULL,
            PRIMARY KEY (chain_id, block_number)
        )",
        schema.table("_block_hashes")
    ))
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            chain_id BIGINT NOT NULL,
            block_number BIGINT NOT NULL,
            tx_index INT NOT NULL,
            log_index INT NOT NULL,
            block_hash TEXT NOT NULL,
            block_timestamp TIMESTAMPTZ NOT NULL,
            transaction_hash TEXT NOT NULL,
            contract_address TEXT NOT NULL,
            event_name TEXT NOT NULL,
            event_sig TEXT NOT NULL,
            args JSONB NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            processed_at TIMESTAMPTZ,
            UNIQUE (chain_id, block_number, tx_index, log_index)
        )",
        schema.table("_events")
    ))
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(&format!(
        "TRUNCATE {}, {}, {}",
        schema.table("_cursor"),
        schema.table("_block_hashes"),
        schema.table("_events")
    ))
    .execute(pool)
    .await
    .unwrap();
}

fn block(number: u64, hash_byte: u8) -> BlockHeader {
    BlockHeader {
        number,
        hash: [hash_byte; 32],
        timestamp: 1_700_000_000 + number,
    }
}

fn hash_hex(byte: u8) -> String {
    format!("{:#x}", alloy::primitives::B256::from([byte; 32]))
}

fn make_fetcher(pool: PgPool, rpc: Arc<MockRpc>, confirmations: u64) -> Fetcher {
    Fetcher::new(
        rpc,
        pool,
        CHAIN_ID,
        Arc::new(DecoderRegistry::new(vec![])),
        CursorStore::new(schema()),
        BlockHashStore::new(schema()),
        EventLogStore::new(schema()),
        confirmations,
        100, // fetch_window
        5,   // reorg_window
        Duration::from_millis(20),
    )
}

#[sqlx::test]
#[ignore]
async fn fetcher_advances_cursor_from_cold_start(pool: PgPool) {
    setup(&pool).await;
    CursorStore::new(schema())
        .initialize_if_absent(&pool, CHAIN_ID, 0)
        .await
        .unwrap();

    let rpc = Arc::new(MockRpc::new().with_head(10));
    for n in 1..=10 {
        rpc.push_block(block(n, 0xAA));
    }

    let fetcher = make_fetcher(pool.clone(), Arc::clone(&rpc), 2);
    let _ = tokio::time::timeout(Duration::from_millis(300), fetcher.run()).await;

    let cursor = CursorStore::new(schema()).get(&pool, CHAIN_ID).await.unwrap().unwrap();
    assert_eq!(cursor.fetched_to_block, 8); // safe head = 10 - 2 confirmations
}

#[sqlx::test]
#[ignore]
async fn fetcher_rewinds_cursor_on_reorg(pool: PgPool) {
    setup(&pool).await;
    let cursor_store = CursorStore::new(schema());
    cursor_store.initialize_if_absent(&pool, CHAIN_ID, 0).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    cursor_store.advance(&mut tx, CHAIN_ID, 8).await.unwrap();
    tx.commit().await.unwrap();

    let hash_store = BlockHashStore::new(schema());
    let mut tx = pool.begin().await.unwrap();
    hash_store
        .insert_batch(
            &mut tx,
            CHAIN_ID,
            &[
                (4, hash_hex(0xAA)),
                (5, hash_hex(0xAA)), // diverges from the live chain below
                (6, hash_hex(0xAA)),
            ],
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let rpc = Arc::new(MockRpc::new().with_head(10));
    rpc.push_block(block(4, 0xAA));
    rpc.push_block(block(5, 0xBB)); // live hash disagrees with what's stored
    rpc.push_block(block(6, 0xBB));
    for n in 7..=10 {
        rpc.push_block(block(n, 0xBB));
    }

    let fetcher = make_fetcher(pool.clone(), Arc::clone(&rpc), 6);
    let _ = tokio::time::timeout(Duration::from_millis(150), fetcher.run()).await;

    let cursor = cursor_store.get(&pool, CHAIN_ID).await.unwrap().unwrap();
    assert_eq!(cursor.fetched_to_block, 4); // rewound to the block before the divergence, and the
                                             // safe head (10 - 6 confirmations = 4) keeps it parked there
}

struct AlwaysOkHandler;

#[async_trait]
impl Handler for AlwaysOkHandler {
    async fn handle(
        &self,
        _tx: &mut Transaction<'_, Postgres>,
        _event: &EventRecord,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

struct AlwaysFailHandler;

#[async_trait]
impl Handler for AlwaysFailHandler {
    async fn handle(
        &self,
        _tx: &mut Transaction<'_, Postgres>,
        _event: &EventRecord,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), AppError> {
        Err(AppError::Internal("handler exploded".to_string()))
    }
}

fn sample_event(contract_address: &str, event_name: &str, block_number: u64) -> DecodedEvent {
    DecodedEvent {
        chain_id: CHAIN_ID,
        pointer: EventPointer::new(block_number, 0, 0),
        block_hash: "0xblock".to_string(),
        block_timestamp: Utc::now(),
        transaction_hash: "0xtx".to_string(),
        contract_address: contract_address.to_string(),
        event_name: event_name.to_string(),
        event_sig: "0xsig".to_string(),
        args: serde_json::json!({}),
    }
}

async fn push_event(pool: &PgPool, event: DecodedEvent) {
    let mut tx = pool.begin().await.unwrap();
    EventLogStore::new(schema())
        .insert_batch(&mut tx, std::slice::from_ref(&event))
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

fn make_dispatcher(pool: PgPool, handlers: HandlerRegistry, rpc: Arc<MockRpc>) -> Dispatcher {
    Dispatcher::new(
        pool,
        CHAIN_ID,
        EventLogStore::new(schema()),
        handlers,
        RepositoryRegistry::new(schema()),
        rpc,
        1,
    )
}

#[sqlx::test]
#[ignore]
async fn dispatcher_marks_a_handled_event_processed(pool: PgPool) {
    setup(&pool).await;
    push_event(&pool, sample_event("0xabc", "Test", 1)).await;

    let mut handlers = HandlerRegistry::new();
    handlers.register("0xabc", "Test", Box::new(AlwaysOkHandler));

    let dispatcher = make_dispatcher(pool.clone(), handlers, Arc::new(MockRpc::new()));
    let _ = tokio::time::timeout(Duration::from_millis(100), dispatcher.run()).await;

    let status: (String,) = sqlx::query_as(&format!(
        "SELECT status FROM {} WHERE contract_address = '0xabc'",
        schema().table("_events")
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status.0, "processed");
}

#[sqlx::test]
#[ignore]
async fn dispatcher_halts_on_missing_handler(pool: PgPool) {
    setup(&pool).await;
    push_event(&pool, sample_event("0xdef", "Unknown", 1)).await;

    let dispatcher = make_dispatcher(pool.clone(), HandlerRegistry::new(), Arc::new(MockRpc::new()));
    let result = dispatcher.run().await;
    assert!(result.is_err());

    let row: (String, Option<String>) = sqlx::query_as(&format!(
        "SELECT status, error_message FROM {} WHERE contract_address = '0xdef'",
        schema().table("_events")
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "failed");
    assert_eq!(row.1.as_deref(), Some("no_handler"));
}

#[sqlx::test]
#[ignore]
async fn dispatcher_halts_and_leaves_the_event_failed_on_handler_error(pool: PgPool) {
    setup(&pool).await;
    push_event(&pool, sample_event("0xabc", "Test", 1)).await;

    let mut handlers = HandlerRegistry::new();
    handlers.register("0xabc", "Test", Box::new(AlwaysFailHandler));

    let dispatcher = make_dispatcher(pool.clone(), handlers, Arc::new(MockRpc::new()));
    let result = dispatcher.run().await;
    assert!(result.is_err());

    let row: (String, Option<String>) = sqlx::query_as(&format!(
        "SELECT status, error_message FROM {} WHERE contract_address = '0xabc'",
        schema().table("_events")
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "failed");
    assert!(row.1.unwrap().contains("handler exploded"));
}

#[sqlx::test]
#[ignore]
async fn progress_monitor_reports_lag_and_fills_in_eta_on_the_second_sample(pool: PgPool) {
    setup(&pool).await;
    let cursor_store = CursorStore::new(schema());
    cursor_store.initialize_if_absent(&pool, CHAIN_ID, 10).await.unwrap();

    let rpc = Arc::new(MockRpc::new().with_head(20));
    let monitor = ProgressMonitor::new(pool.clone(), CHAIN_ID, cursor_store.clone(), rpc);

    let first = monitor.snapshot().await.unwrap();
    assert_eq!(first.fetched_to_block, 10);
    assert_eq!(first.blocks_remaining, 10);
    assert!(first.estimated_seconds_remaining.is_none());

    let mut tx = pool.begin().await.unwrap();
    cursor_store.advance(&mut tx, CHAIN_ID, 15).await.unwrap();
    tx.commit().await.unwrap();

    let second = monitor.snapshot().await.unwrap();
    assert_eq!(second.fetched_to_block, 15);
    assert_eq!(second.blocks_remaining, 5);
    assert!(second.estimated_seconds_remaining.is_some());
}
