//! Event Log Store: the durable queue of decoded events.

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use chainledger_common::types::{DecodedEvent, EventPointer, EventRecord, EventStatus};
use sqlx::{Postgres, Row, Transaction};

pub struct EventLogStore {
    schema: SchemaName,
}

impl EventLogStore {
    pub fn new(schema: SchemaName) -> Self {
        Self { schema }
    }

    /// Insert a batch of decoded events. `ON CONFLICT ... DO NOTHING` makes
    /// this idempotent across Fetcher retries.
    pub async fn insert_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        events: &[DecodedEvent],
    ) -> Result<(), AppError> {
        let table = self.schema.table("_events");

        for event in events {
            sqlx::query(&format!(
                r#"
                INSERT INTO {table}
                    (chain_id, block_number, tx_index, log_index, block_hash, block_timestamp,
                     transaction_hash, contract_address, event_name, event_sig, args, status,
                     created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending', now())
                ON CONFLICT (chain_id, block_number, tx_index, log_index) DO NOTHING
                "#
            ))
            .bind(to_i64(event.chain_id)?)
            .bind(to_i64(event.pointer.block_number)?)
            .bind(event.pointer.tx_index as i32)
            .bind(event.pointer.log_index as i32)
            .bind(&event.block_hash)
            .bind(event.block_timestamp)
            .bind(&event.transaction_hash)
            .bind(&event.contract_address)
            .bind(&event.event_name)
            .bind(&event.event_sig)
            .bind(&event.args)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Return up to `limit` pending events in strict `(block, tx, log)`
    /// order, locked `FOR UPDATE SKIP LOCKED` for future multi-dispatcher
    /// tolerance.
    pub async fn get_next_pending_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        limit: i64,
    ) -> Result<Vec<EventRecord>, AppError> {
        let table = self.schema.table("_events");

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, chain_id, block_number, tx_index, log_index, block_hash, block_timestamp,
                   transaction_hash, contract_address, event_name, event_sig, args, status,
                   error_message, created_at, processed_at
            FROM {table}
            WHERE chain_id = $1 AND status = 'pending'
            ORDER BY block_number ASC, tx_index ASC, log_index ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(to_i64(chain_id)?)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Mark an event processed. Fails loudly if no row was
    /// updated — a lost event is a correctness violation, not a no-op.
    pub async fn mark_processed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<(), AppError> {
        let table = self.schema.table("_events");
        let result = sqlx::query(&format!(
            "UPDATE {table} SET status = 'processed', processed_at = now() WHERE id = $1"
        ))
        .bind(id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!(
                "mark_processed affected no rows for event id {id} — event lost"
            )));
        }
        Ok(())
    }

    /// Mark an event failed with `error_message`. The dispatcher halts the
    /// chain at this event until an operator intervenes.
    pub async fn mark_failed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        error_message: &str,
    ) -> Result<(), AppError> {
        let table = self.schema.table("_events");
        let result = sqlx::query(&format!(
            "UPDATE {table} SET status = 'failed', processed_at = now(), error_message = $2 WHERE id = $1"
        ))
        .bind(id)
        .bind(error_message)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!(
                "mark_failed affected no rows for event id {id} — event lost"
            )));
        }
        Ok(())
    }

    /// Delete events `>= block`. Used by reorg rewind.
    pub async fn delete_from_block(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        block: u64,
    ) -> Result<u64, AppError> {
        let table = self.schema.table("_events");
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE chain_id = $1 AND block_number >= $2"
        ))
        .bind(to_i64(chain_id)?)
        .bind(to_i64(block)?)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<EventRecord, AppError> {
    let status_raw: String = row.try_get("status")?;
    let status = match status_raw.as_str() {
        "pending" => EventStatus::Pending,
        "processed" => EventStatus::Processed,
        "failed" => EventStatus::Failed,
        other => {
            return Err(AppError::Internal(format!(
                "unrecognized event status '{other}' in storage"
            )));
        }
    };

    Ok(EventRecord {
        id: row.try_get("id")?,
        chain_id: row.try_get::<i64, _>("chain_id")? as u64,
        pointer: EventPointer::new(
            row.try_get::<i64, _>("block_number")? as u64,
            row.try_get::<i32, _>("tx_index")? as u32,
            row.try_get::<i32, _>("log_index")? as u32,
        ),
        block_hash: row.try_get("block_hash")?,
        block_timestamp: row.try_get("block_timestamp")?,
        transaction_hash: row.try_get("transaction_hash")?,
        contract_address: row.try_get("contract_address")?,
        event_name: row.try_get("event_name")?,
        event_sig: row.try_get("event_sig")?,
        args: row.try_get("args")?,
        status,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn to_i64(value: u64) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{value} does not fit in i64")))
}
