//! Lock Manager.
//!
//! A single process per `(schema, chain)` may write. The lock identifier is
//! a deterministic 64-bit signed integer derived from
//! `SHA-256(schema ":" chain_id ":" purpose)[0..8]`. The manager opens a
//! dedicated connection, makes one non-blocking attempt at the advisory
//! lock, and retries up to 4 more times at 2-second intervals (5 attempts
//! total) to tolerate rolling deployments. Losing the connection is
//! equivalent to losing the lock.

use std::time::Duration;

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use sha2::{Digest, Sha256};
use sqlx::PgConnection;

const DEFAULT_RETRY_ATTEMPTS: u32 = 4;
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Compute the 64-bit signed advisory lock key for `(schema, chain_id, purpose)`.
pub fn lock_key(schema: &SchemaName, chain_id: u64, purpose: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(schema.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(chain_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(purpose.as_bytes());
    let digest = hasher.finalize();
    i64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest has 32 bytes"))
}

/// Holds a Postgres advisory lock for the lifetime of the process.
///
/// The connection backing the lock is never returned to a pool: the lock
/// is tied to the session that took it.
/// Dropping (or explicitly releasing) this value releases the lock.
pub struct LockManager {
    conn: Option<PgConnection>,
    key: i64,
}

impl LockManager {
    /// Attempt to acquire the advisory lock: one initial try, then up to
    /// `DEFAULT_RETRY_ATTEMPTS` retries at `RETRY_INTERVAL`. Fatal (returns
    /// `Err`) if the budget is exhausted.
    pub async fn acquire(
        conn: PgConnection,
        schema: &SchemaName,
        chain_id: u64,
        purpose: &str,
    ) -> Result<Self, AppError> {
        Self::acquire_with_retries(conn, schema, chain_id, purpose, DEFAULT_RETRY_ATTEMPTS).await
    }

    /// Same as [`acquire`], with a caller-supplied retry budget (used in
    /// tests to avoid sleeping several seconds per run). `retries` counts
    /// attempts *after* the initial one, so the total attempt count is
    /// `retries + 1`.
    pub async fn acquire_with_retries(
        mut conn: PgConnection,
        schema: &SchemaName,
        chain_id: u64,
        purpose: &str,
        retries: u32,
    ) -> Result<Self, AppError> {
        let key = lock_key(schema, chain_id, purpose);
        let total_attempts = retries + 1;

        for attempt in 1..=total_attempts {
            let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
                .bind(key)
                .fetch_one(&mut conn)
                .await?;

            if acquired.0 {
                tracing::info!(schema = %schema, chain_id, attempt, "lock_acquired");
                return Ok(Self {
                    conn: Some(conn),
                    key,
                });
            }

            tracing::warn!(
                schema = %schema,
                chain_id,
                attempt,
                total_attempts,
                "lock_busy_retrying"
            );

            if attempt < total_attempts {
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }

        Err(AppError::Lock(format!(
            "could not acquire advisory lock for schema '{schema}' chain {chain_id} after {total_attempts} attempts"
        )))
    }

    /// Release the lock and hand back the underlying connection.
    pub async fn release(mut self) -> Result<PgConnection, AppError> {
        let mut conn = self.conn.take().expect("conn present while manager alive");
        let _: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .fetch_one(&mut conn)
            .await?;
        tracing::info!(key = self.key, "lock_released");
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic() {
        let schema = SchemaName::parse("flare_mainnet").unwrap();
        let a = lock_key(&schema, 14, "indexer");
        let b = lock_key(&schema, 14, "indexer");
        assert_eq!(a, b);
    }

    #[test]
    fn lock_key_differs_by_chain() {
        let schema = SchemaName::parse("flare_mainnet").unwrap();
        let a = lock_key(&schema, 14, "indexer");
        let b = lock_key(&schema, 19, "indexer");
        assert_ne!(a, b);
    }

    #[test]
    fn lock_key_differs_by_purpose() {
        let schema = SchemaName::parse("flare_mainnet").unwrap();
        let a = lock_key(&schema, 14, "indexer");
        let b = lock_key(&schema, 14, "monitor");
        assert_ne!(a, b);
    }

    #[test]
    fn lock_key_differs_by_schema() {
        let a = lock_key(&SchemaName::parse("flare_mainnet").unwrap(), 14, "indexer");
        let b = lock_key(&SchemaName::parse("songbird_mainnet").unwrap(), 14, "indexer");
        assert_ne!(a, b);
    }
}
