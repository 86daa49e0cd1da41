use sqlx::{Connection, PgConnection, PgPool};
use sqlx::postgres::PgPoolOptions;

/// Create a PostgreSQL connection pool for the Fetcher/Dispatcher/API surface.
///
/// `max_connections` controls the maximum number of connections in the pool.
/// The Lock Manager does NOT use this pool — it holds one dedicated
/// connection for the process lifetime (see [`connect_dedicated`]).
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "connected to PostgreSQL");
    Ok(pool)
}

/// Open a single dedicated connection, outside of any pool.
///
/// Used by the Lock Manager: the advisory lock is tied to the connection
/// that took it, so it must be a connection nothing else can check back in
/// or reuse.
pub async fn connect_dedicated(database_url: &str) -> anyhow::Result<PgConnection> {
    let conn = PgConnection::connect(database_url).await?;
    Ok(conn)
}
