//! Dispatcher: drains the pending event queue in strict order, one
//! transaction per batch.
//!
//! Resolution is by `(contract_address, event_name)`. A missing handler
//! fails the event rather than skipping it — silently dropping an event the
//! indexer doesn't know how to handle would leave its effects unrecorded
//! without any operator-visible signal. A handler that returns an error
//! also fails the event and halts: the same event stays at the head of the
//! queue until an operator intervenes, since downstream state may depend on
//! events being applied in order.

use std::sync::Arc;
use std::time::Duration;

use chainledger_common::error::AppError;
use chainledger_common::rpc::ChainRpc;
use chainledger_common::types::EventStatus;
use chainledger_repo::{HandlerContext, HandlerRegistry, RepositoryRegistry};
use chainledger_store::EventLogStore;
use sqlx::PgPool;

const EMPTY_QUEUE_SLEEP: Duration = Duration::from_millis(200);

pub struct Dispatcher {
    pool: PgPool,
    chain_id: u64,
    event_store: EventLogStore,
    handlers: HandlerRegistry,
    repos: RepositoryRegistry,
    rpc: Arc<dyn ChainRpc>,
    batch_size: i64,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        chain_id: u64,
        event_store: EventLogStore,
        handlers: HandlerRegistry,
        repos: RepositoryRegistry,
        rpc: Arc<dyn ChainRpc>,
        batch_size: i64,
    ) -> Self {
        Self {
            pool,
            chain_id,
            event_store,
            handlers,
            repos,
            rpc,
            batch_size,
        }
    }

    /// Run until cancelled or a handler failure halts the chain.
    pub async fn run(&self) -> Result<(), AppError> {
        loop {
            if !self.drain_once().await? {
                tokio::time::sleep(EMPTY_QUEUE_SLEEP).await;
            }
        }
    }

    /// Dispatch one batch. Returns `false` if the queue was empty.
    async fn drain_once(&self) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let batch = self
            .event_store
            .get_next_pending_batch(&mut tx, self.chain_id, self.batch_size)
            .await?;

        if batch.is_empty() {
            tx.commit().await?;
            return Ok(false);
        }

        for event in &batch {
            let ctx = HandlerContext::new(&self.repos, Arc::clone(&self.rpc), self.chain_id);

            let outcome = match self.handlers.resolve(&event.contract_address, &event.event_name) {
                None => Err("no_handler".to_string()),
                Some(handler) => handler
                    .handle(&mut tx, event, &ctx)
                    .await
                    .map_err(|e| e.to_string()),
            };

            match outcome {
                Ok(()) => {
                    self.event_store.mark_processed(&mut tx, event.id).await?;
                    tracing::info!(
                        event_id = event.id,
                        contract_address = %event.contract_address,
                        event_name = %event.event_name,
                        "event_processed"
                    );
                }
                Err(reason) => {
                    self.event_store.mark_failed(&mut tx, event.id, &reason).await?;
                    tx.commit().await?;
                    tracing::error!(
                        event_id = event.id,
                        contract_address = %event.contract_address,
                        event_name = %event.event_name,
                        reason = %reason,
                        "event_failed"
                    );
                    return Err(AppError::Internal(format!(
                        "event {} failed ({reason}); halting at {:?} pending operator intervention",
                        event.id,
                        EventStatus::Failed
                    )));
                }
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}
