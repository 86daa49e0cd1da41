use crate::schema::SchemaName;

/// Global application configuration loaded from environment variables.
///
/// Deliberately a thin env-var reader, not a config-file parser — `.env`
/// loading and CLI flag parsing are external collaborators; this
/// is the one place the process touches `std::env`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Postgres schema this process owns, a validated identifier.
    pub schema: SchemaName,

    /// Chain ID of the EVM-compatible chain this process indexes.
    pub chain_id: u64,

    /// RPC URL for the chain.
    pub chain_rpc_url: String,

    /// Confirmations subtracted from the chain head to compute the safe head.
    pub confirmations: u64,

    /// Maximum number of blocks fetched per Fetcher iteration.
    pub fetch_window: u64,

    /// Reorg window: number of recent blocks whose hashes are retained.
    pub reorg_window: u64,

    /// Sleep interval between Fetcher iterations when caught up to the safe head.
    pub poll_interval_ms: u64,

    /// Number of pending events drained per Dispatcher transaction.
    pub dispatch_batch_size: i64,

    /// Maximum number of PostgreSQL connections in the pool.
    pub db_max_connections: u32,

    /// Timeout applied to every outbound RPC call.
    pub rpc_timeout_secs: u64,

    /// Statement timeout applied to every database transaction.
    pub db_statement_timeout_secs: u64,

    /// Block this process should start indexing from if no cursor exists yet.
    pub start_block: u64,

    /// Minimum log level (`DEBUG`, `INFO`, `WARN`, `ERROR`).
    pub log_level: String,

    /// Whether logs render pretty (human-readable) instead of JSON.
    pub log_pretty: bool,

    /// OTLP passthrough configuration. OTLP export itself is external;
    /// these fields exist so operators can set them without a config error.
    pub otlp_exporter_endpoint: Option<String>,
    pub otlp_service_name: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let schema_raw = std::env::var("SCHEMA")
            .or_else(|_| std::env::var("NETWORK"))
            .map_err(|_| anyhow::anyhow!("SCHEMA (or NETWORK) environment variable is required"))?;
        let schema = SchemaName::parse(schema_raw)
            .map_err(|e| anyhow::anyhow!("invalid schema identifier: {e}"))?;

        Ok(Self {
            database_url: env_required("DATABASE_URL")?,
            schema,
            chain_id: env_parsed("CHAIN_ID", None)?,
            chain_rpc_url: env_required("CHAIN_RPC_URL")?,
            confirmations: env_parsed("CHAIN_CONFIRMATIONS", Some("12"))?,
            fetch_window: env_parsed("CHAIN_FETCH_WINDOW", Some("2000"))?,
            reorg_window: env_parsed("CHAIN_REORG_WINDOW", Some("64"))?,
            poll_interval_ms: env_parsed("CHAIN_POLL_INTERVAL_MS", Some("2000"))?,
            dispatch_batch_size: env_parsed("DISPATCH_BATCH_SIZE", Some("1"))?,
            db_max_connections: env_parsed("DB_MAX_CONNECTIONS", Some("20"))?,
            rpc_timeout_secs: env_parsed("RPC_TIMEOUT_SECS", Some("30"))?,
            db_statement_timeout_secs: env_parsed("DB_STATEMENT_TIMEOUT_SECS", Some("30"))?,
            start_block: env_parsed("START_BLOCK", Some("0"))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            log_pretty: env_parsed("LOG_PRETTY", Some("false"))?,
            otlp_exporter_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            otlp_service_name: std::env::var("OTEL_SERVICE_NAME").ok(),
        })
    }
}

fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} environment variable is required"))
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: Option<&str>) -> anyhow::Result<T> {
    let raw = match std::env::var(key) {
        Ok(v) => v,
        Err(_) => match default {
            Some(d) => d.to_string(),
            None => return Err(anyhow::anyhow!("{key} environment variable is required")),
        },
    };
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("{key} must be a valid {}", std::any::type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "SCHEMA",
            "NETWORK",
            "CHAIN_ID",
            "CHAIN_RPC_URL",
            "CHAIN_CONFIRMATIONS",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("SCHEMA", "flare_mainnet");
            std::env::set_var("CHAIN_ID", "14");
            std::env::set_var("CHAIN_RPC_URL", "http://localhost:8545");
        }
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/db");
            std::env::set_var("SCHEMA", "1-not-valid");
            std::env::set_var("CHAIN_ID", "14");
            std::env::set_var("CHAIN_RPC_URL", "http://localhost:8545");
        }
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn defaults_are_applied() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/db");
            std::env::set_var("SCHEMA", "flare_mainnet");
            std::env::set_var("CHAIN_ID", "14");
            std::env::set_var("CHAIN_RPC_URL", "http://localhost:8545");
        }
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.reorg_window, 64);
        assert_eq!(config.dispatch_batch_size, 1);
        clear_env();
    }
}
