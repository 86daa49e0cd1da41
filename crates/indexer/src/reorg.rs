//! Reorg detection: compare the stored block-hash window against live chain
//! state before every fetch.
//!
//! Unlike an in-memory sliding window, the Block Hash Store is durable —
//! detection has to survive process restarts, so the comparison walks the
//! persisted `[fetched_to_block - reorg_window, fetched_to_block]` range
//! rather than anything held in the detector itself.

use chainledger_common::error::AppError;
use chainledger_common::rpc::ChainRpc;
use chainledger_store::BlockHashStore;
use sqlx::PgPool;

pub struct ReorgDetector {
    hash_store: BlockHashStore,
}

impl ReorgDetector {
    pub fn new(hash_store: BlockHashStore) -> Self {
        Self { hash_store }
    }

    /// Find the earliest block in the stored window whose hash no longer
    /// matches the live chain. `None` means the window is still canonical.
    pub async fn find_divergence(
        &self,
        pool: &PgPool,
        rpc: &dyn ChainRpc,
        chain_id: u64,
        fetched_to_block: u64,
        reorg_window: u64,
    ) -> Result<Option<u64>, AppError> {
        let window_start = fetched_to_block.saturating_sub(reorg_window);
        let stored = self
            .hash_store
            .get_range(pool, chain_id, window_start, fetched_to_block)
            .await?;

        for (block_number, stored_hash) in stored {
            let live_hash = rpc
                .get_block(block_number)
                .await?
                .map(|header| format!("{:#x}", alloy::primitives::B256::from(header.hash)));

            if live_hash.as_deref() != Some(stored_hash.as_str()) {
                tracing::warn!(chain_id, block_number, stored_hash = %stored_hash, "reorg_detected");
                return Ok(Some(block_number));
            }
        }

        Ok(None)
    }
}
