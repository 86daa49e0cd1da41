//! Block Hash Store: `(chain, block_number) → block_hash` for a
//! bounded recent window, used to detect reorgs.

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use sqlx::{PgPool, Postgres, Transaction};

/// Postgres binds one parameter per `$n`; stay comfortably under its
/// 65535 hard limit.
const MAX_BIND_PARAMS: usize = 65_535;
const COLUMNS_PER_ROW: usize = 3;

#[derive(Clone)]
pub struct BlockHashStore {
    schema: SchemaName,
}

impl BlockHashStore {
    pub fn new(schema: SchemaName) -> Self {
        Self { schema }
    }

    /// Batched insert with `ON CONFLICT DO NOTHING`, preserving replayability.
    /// Chunks input so no single statement binds more than
    /// [`MAX_BIND_PARAMS`] parameters.
    pub async fn insert_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        rows: &[(u64, String)],
    ) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }

        let table = self.schema.table("_block_hashes");
        let chain_id = to_i64(chain_id)?;
        let max_rows_per_stmt = MAX_BIND_PARAMS / COLUMNS_PER_ROW;

        for chunk in rows.chunks(max_rows_per_stmt) {
            let mut query = format!(
                "INSERT INTO {table} (chain_id, block_number, block_hash) VALUES "
            );
            let placeholders: Vec<String> = (0..chunk.len())
                .map(|i| {
                    let base = i * COLUMNS_PER_ROW;
                    format!("(${}, ${}, ${})", base + 1, base + 2, base + 3)
                })
                .collect();
            query.push_str(&placeholders.join(", "));
            query.push_str(" ON CONFLICT (chain_id, block_number) DO NOTHING");

            let mut q = sqlx::query(&query);
            for (block_number, block_hash) in chunk {
                q = q.bind(chain_id).bind(to_i64(*block_number)?).bind(block_hash);
            }
            q.execute(&mut **tx).await?;
        }

        Ok(())
    }

    pub async fn get(
        &self,
        pool: &PgPool,
        chain_id: u64,
        block_number: u64,
    ) -> Result<Option<String>, AppError> {
        let table = self.schema.table("_block_hashes");
        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT block_hash FROM {table} WHERE chain_id = $1 AND block_number = $2"
        ))
        .bind(to_i64(chain_id)?)
        .bind(to_i64(block_number)?)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(hash,)| hash))
    }

    /// Stored `(block_number, block_hash)` pairs in `[from_block, to_block]`,
    /// ascending. The Fetcher's reorg check walks this against live RPC state.
    pub async fn get_range(
        &self,
        pool: &PgPool,
        chain_id: u64,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<(u64, String)>, AppError> {
        let table = self.schema.table("_block_hashes");
        let rows: Vec<(i64, String)> = sqlx::query_as(&format!(
            "SELECT block_number, block_hash FROM {table} \
             WHERE chain_id = $1 AND block_number >= $2 AND block_number <= $3 \
             ORDER BY block_number ASC"
        ))
        .bind(to_i64(chain_id)?)
        .bind(to_i64(from_block)?)
        .bind(to_i64(to_block)?)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(block_number, hash)| (block_number as u64, hash))
            .collect())
    }

    /// Delete all hashes `>= block`. Used by reorg rewind.
    pub async fn delete_from_block(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chain_id: u64,
        block: u64,
    ) -> Result<u64, AppError> {
        let table = self.schema.table("_block_hashes");
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE chain_id = $1 AND block_number >= $2"
        ))
        .bind(to_i64(chain_id)?)
        .bind(to_i64(block)?)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Prune rows older than the reorg window's lower bound.
    pub async fn delete_before(
        &self,
        pool: &PgPool,
        chain_id: u64,
        block: u64,
    ) -> Result<u64, AppError> {
        let table = self.schema.table("_block_hashes");
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE chain_id = $1 AND block_number < $2"
        ))
        .bind(to_i64(chain_id)?)
        .bind(to_i64(block)?)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn to_i64(value: u64) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{value} does not fit in i64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_max_bind_params() {
        let max_rows_per_stmt = MAX_BIND_PARAMS / COLUMNS_PER_ROW;
        assert!(max_rows_per_stmt * COLUMNS_PER_ROW <= MAX_BIND_PARAMS);
        assert!(max_rows_per_stmt > 20_000);
    }
}
