//! Fetcher: the chain-to-database edge of the indexer.
//!
//! One iteration either rewinds past a reorg, advances the cursor by
//! fetching and decoding a window of blocks, or — once caught up to the
//! safe head — sleeps. RPC failures back off with jitter and shrink the
//! fetch window; transient database failures retry a bounded number of
//! times before the process gives up and terminates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chainledger_common::error::AppError;
use chainledger_common::rpc::ChainRpc;
use chainledger_common::types::DecodedEvent;
use chainledger_decoder::{DecodeOutcome, DecoderRegistry};
use chainledger_store::{BlockHashStore, CursorStore, EventLogStore};
use chrono::{TimeZone, Utc};
use sqlx::PgPool;

use crate::reorg::ReorgDetector;

const MAX_DB_RETRIES: u32 = 3;
const MAX_RPC_BACKOFF_MS: u64 = 60_000;

enum Tick {
    Advanced,
    Idle,
    ReorgRewound,
}

pub struct Fetcher {
    rpc: Arc<dyn ChainRpc>,
    pool: PgPool,
    chain_id: u64,
    decoder: Arc<DecoderRegistry>,
    cursor_store: CursorStore,
    hash_store: BlockHashStore,
    event_store: EventLogStore,
    reorg_detector: ReorgDetector,
    confirmations: u64,
    fetch_window: u64,
    reorg_window: u64,
    poll_interval: Duration,
}

impl Fetcher {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        pool: PgPool,
        chain_id: u64,
        decoder: Arc<DecoderRegistry>,
        cursor_store: CursorStore,
        hash_store: BlockHashStore,
        event_store: EventLogStore,
        confirmations: u64,
        fetch_window: u64,
        reorg_window: u64,
        poll_interval: Duration,
    ) -> Self {
        let reorg_detector = ReorgDetector::new(hash_store.clone());
        Self {
            rpc,
            pool,
            chain_id,
            decoder,
            cursor_store,
            hash_store,
            event_store,
            reorg_detector,
            confirmations,
            fetch_window,
            reorg_window,
            poll_interval,
        }
    }

    /// Run until cancelled or a non-transient error escalates.
    pub async fn run(&self) -> Result<(), AppError> {
        let mut window = self.fetch_window;
        let mut rpc_backoff_ms = 500u64;
        let mut db_retries = 0u32;

        loop {
            match self.tick(window).await {
                Ok(Tick::Advanced) => {
                    window = self.fetch_window;
                    rpc_backoff_ms = 500;
                    db_retries = 0;
                }
                Ok(Tick::ReorgRewound) => {
                    db_retries = 0;
                }
                Ok(Tick::Idle) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(AppError::Rpc(msg)) => {
                    tracing::warn!(error = %msg, backoff_ms = rpc_backoff_ms, window, "rpc error, backing off");
                    tokio::time::sleep(jittered_millis(rpc_backoff_ms)).await;
                    rpc_backoff_ms = (rpc_backoff_ms * 2).min(MAX_RPC_BACKOFF_MS);
                    window = (window / 2).max(1);
                }
                Err(e) if e.is_transient() => {
                    db_retries += 1;
                    if db_retries > MAX_DB_RETRIES {
                        tracing::error!(error = %e, "database retries exhausted, terminating");
                        return Err(e);
                    }
                    let delay_ms = 2u64.pow(db_retries) * 1000;
                    tracing::warn!(error = %e, attempt = db_retries, "transient database error, retrying");
                    tokio::time::sleep(jittered_millis(delay_ms)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "fatal fetcher error, terminating");
                    return Err(e);
                }
            }
        }
    }

    async fn tick(&self, window: u64) -> Result<Tick, AppError> {
        let cursor = self
            .cursor_store
            .get(&self.pool, self.chain_id)
            .await?
            .ok_or_else(|| AppError::Internal("cursor missing, coordinator must initialize it first".into()))?;

        if let Some(reorg_block) = self
            .reorg_detector
            .find_divergence(
                &self.pool,
                self.rpc.as_ref(),
                self.chain_id,
                cursor.fetched_to_block,
                self.reorg_window,
            )
            .await?
        {
            self.rewind(reorg_block).await?;
            return Ok(Tick::ReorgRewound);
        }

        let head = self.rpc.get_block_number().await?;
        let safe = head.saturating_sub(self.confirmations);

        if safe <= cursor.fetched_to_block {
            return Ok(Tick::Idle);
        }

        let from_block = cursor.fetched_to_block + 1;
        let to_block = safe.min(cursor.fetched_to_block + window);

        let addresses = self.decoder.known_addresses();
        let logs = self.rpc.get_logs(from_block, to_block, &addresses).await?;

        let mut timestamps: HashMap<u64, chrono::DateTime<Utc>> = HashMap::new();
        let mut hash_rows = Vec::with_capacity((to_block - from_block + 1) as usize);
        for block_number in from_block..=to_block {
            let header = self
                .rpc
                .get_block(block_number)
                .await?
                .ok_or_else(|| AppError::Rpc(format!("block {block_number} not yet available")))?;
            let hash = format!("{:#x}", alloy::primitives::B256::from(header.hash));
            hash_rows.push((block_number, hash));
            let ts = Utc
                .timestamp_opt(header.timestamp as i64, 0)
                .single()
                .unwrap_or_else(Utc::now);
            timestamps.insert(block_number, ts);
        }

        let mut decoded = Vec::new();
        for log in &logs {
            let ts = timestamps.get(&log.block_number).copied().unwrap_or_else(Utc::now);
            match self.decoder.decode(log, self.chain_id, ts) {
                DecodeOutcome::Decoded(event) => decoded.push(event),
                DecodeOutcome::Skipped(reason) => {
                    tracing::warn!(
                        contract_address = %log.address,
                        reason = %reason,
                        block_number = log.block_number,
                        "decode_error"
                    );
                }
                DecodeOutcome::MissingHandler(event_name) => {
                    tracing::warn!(
                        contract_address = %log.address,
                        event_name = %event_name,
                        block_number = log.block_number,
                        "missing_handler"
                    );
                }
            }
        }

        self.persist_window(&decoded, &hash_rows, to_block).await?;

        let lower_bound = to_block.saturating_sub(self.reorg_window);
        self.hash_store
            .delete_before(&self.pool, self.chain_id, lower_bound)
            .await?;

        tracing::info!(from_block, to_block, events = decoded.len(), "fetch_window_completed");
        Ok(Tick::Advanced)
    }

    async fn persist_window(
        &self,
        events: &[DecodedEvent],
        hash_rows: &[(u64, String)],
        to_block: u64,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        self.event_store.insert_batch(&mut tx, events).await?;
        self.hash_store.insert_batch(&mut tx, self.chain_id, hash_rows).await?;
        self.cursor_store.advance(&mut tx, self.chain_id, to_block).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rewind(&self, reorg_block: u64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        self.cursor_store.get_for_update(&mut tx, self.chain_id).await?;
        self.hash_store
            .delete_from_block(&mut tx, self.chain_id, reorg_block)
            .await?;
        self.event_store
            .delete_from_block(&mut tx, self.chain_id, reorg_block)
            .await?;
        let rewound_to = reorg_block.saturating_sub(1);
        self.cursor_store.reset(&mut tx, self.chain_id, rewound_to).await?;
        tx.commit().await?;
        tracing::warn!(reorg_block, rewound_to, "reorg rewind committed");
        Ok(())
    }
}

fn jittered_millis(base_ms: u64) -> Duration {
    let factor = 0.5 + rand::random::<f64>();
    Duration::from_secs_f64(base_ms as f64 / 1000.0 * factor)
}
