//! Progress Monitor: a low-frequency background task that reports how far
//! behind the chain head the cursor is. Purely observational — it never
//! writes, so it isn't subject to the single-writer lock.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chainledger_common::rpc::ChainRpc;
use chainledger_store::CursorStore;
use sqlx::PgPool;

const REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// A point-in-time read of how far behind the chain head the cursor is.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressSnapshot {
    pub chain_id: u64,
    pub fetched_to_block: u64,
    pub chain_head: u64,
    pub blocks_remaining: u64,
    /// `None` until two samples have been taken, or once the cursor stops
    /// advancing between samples (can't divide by a zero rate).
    pub estimated_seconds_remaining: Option<u64>,
}

#[derive(Clone)]
pub struct ProgressMonitor {
    pool: PgPool,
    chain_id: u64,
    cursor_store: CursorStore,
    rpc: Arc<dyn ChainRpc>,
    last_sample: Arc<Mutex<Option<(Instant, u64)>>>,
}

impl ProgressMonitor {
    pub fn new(pool: PgPool, chain_id: u64, cursor_store: CursorStore, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            pool,
            chain_id,
            cursor_store,
            rpc,
            last_sample: Arc::new(Mutex::new(None)),
        }
    }

    /// Read the cursor and chain head once, for callers that just need the
    /// current numbers rather than the periodic background report.
    ///
    /// The ETA is derived from the fetch rate between this call and the
    /// previous one, so it takes two samples to produce a number.
    pub async fn snapshot(&self) -> Result<ProgressSnapshot, chainledger_common::error::AppError> {
        let fetched_to_block = self
            .cursor_store
            .get(&self.pool, self.chain_id)
            .await?
            .map(|c| c.fetched_to_block)
            .unwrap_or(0);
        let chain_head = self.rpc.get_block_number().await?;
        let blocks_remaining = chain_head.saturating_sub(fetched_to_block);

        let now = Instant::now();
        let mut last = self.last_sample.lock().unwrap();
        let estimated_seconds_remaining = last.and_then(|(prev_at, prev_fetched)| {
            let elapsed = now.duration_since(prev_at).as_secs_f64();
            let advanced = fetched_to_block.checked_sub(prev_fetched)?;
            if elapsed <= 0.0 || advanced == 0 {
                return None;
            }
            let blocks_per_sec = advanced as f64 / elapsed;
            Some((blocks_remaining as f64 / blocks_per_sec).round() as u64)
        });
        *last = Some((now, fetched_to_block));
        drop(last);

        Ok(ProgressSnapshot {
            chain_id: self.chain_id,
            fetched_to_block,
            chain_head,
            blocks_remaining,
            estimated_seconds_remaining,
        })
    }

    /// Report progress on a fixed interval until cancelled. Errors reading
    /// progress are logged and skipped rather than propagated — a failed
    /// report is not a reason to stop indexing.
    pub async fn run(&self) {
        loop {
            tokio::time::sleep(REPORT_INTERVAL).await;

            match self.snapshot().await {
                Ok(s) => {
                    tracing::info!(
                        chain_id = s.chain_id,
                        fetched_to_block = s.fetched_to_block,
                        head = s.chain_head,
                        lag = s.blocks_remaining,
                        eta_secs = s.estimated_seconds_remaining,
                        "indexer_progress"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "progress monitor failed to read progress");
                }
            }
        }
    }
}

