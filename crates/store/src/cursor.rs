//! Cursor Store: the durable `fetched_to_block` progress marker.

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub chain_id: u64,
    pub fetched_to_block: u64,
}

#[derive(Clone)]
pub struct CursorStore {
    schema: SchemaName,
}

impl CursorStore {
    pub fn new(schema: SchemaName) -> Self {
        Self { schema }
    }

    /// Create the cursor row with `start_block` if one doesn't already exist.
    pub async fn initialize_if_absent(
        &self,
        pool: &PgPool,
        chain_id: u64,
        start_block: u64,
    ) -> Result<(), AppError> {
        let table = self.schema.table("_cursor");
        let start_block: i64 = to_i64(start_block)?;
        let chain_id: i64 = to_i64(chain_id)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (chain_id, fetched_to_block, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (chain_id) DO NOTHING
            "#
        ))
        .bind(chain_id)
        .bind(start_block)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Read the current cursor without locking.
    pub async fn get(&self, pool: &PgPool, chain_id: u64) -> Result<Option<Cursor>, AppError> {
        let table = self.schema.table("_cursor");
        let chain_id_i64 = to_i64(chain_id)?;

        let row: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT fetched_to_block FROM {table} WHERE chain_id = $1"
        ))
        .bind(chain_id_i64)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(fetched_to_block,)| Cursor {
            chain_id,
            fetched_to_block: fetched_to_block as u64,
        }))
    }

    /// Read the cursor row with `FOR UPDATE`, inside `tx`. Required before
    /// any reorg rewind.
    pub async fn get_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
    ) -> Result<Option<Cursor>, AppError> {
        let table = self.schema.table("_cursor");
        let chain_id_i64 = to_i64(chain_id)?;

        let row: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT fetched_to_block FROM {table} WHERE chain_id = $1 FOR UPDATE"
        ))
        .bind(chain_id_i64)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|(fetched_to_block,)| Cursor {
            chain_id,
            fetched_to_block: fetched_to_block as u64,
        }))
    }

    /// Advance the cursor forward. Tolerated without a prior locked read
    /// when a single writer is guaranteed — the Fetcher is that
    /// writer.
    pub async fn advance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        to_block: u64,
    ) -> Result<(), AppError> {
        self.write(tx, chain_id, to_block).await
    }

    /// Rewind the cursor after a reorg. Always used on the locked path
    /// (`get_for_update` first).
    pub async fn reset(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        to_block: u64,
    ) -> Result<(), AppError> {
        self.write(tx, chain_id, to_block).await
    }

    async fn write(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        to_block: u64,
    ) -> Result<(), AppError> {
        let table = self.schema.table("_cursor");
        let chain_id_i64 = to_i64(chain_id)?;
        let to_block_i64 = to_i64(to_block)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (chain_id, fetched_to_block, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (chain_id) DO UPDATE SET fetched_to_block = $2, updated_at = now()
            "#
        ))
        .bind(chain_id_i64)
        .bind(to_block_i64)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

fn to_i64(value: u64) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{value} does not fit in i64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_values_overflowing_i64() {
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_i64(100).is_ok());
    }
}
