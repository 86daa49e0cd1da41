//! `ChainRpc`: the abstracted EVM JSON-RPC surface.
//!
//! Everything the Fetcher, the Reorg detector, and validating handlers need
//! from the chain goes through this trait rather than directly through
//! `alloy::providers::Provider`, so tests can swap in [`MockRpc`] without a
//! live RPC endpoint.

use async_trait::async_trait;

use crate::error::AppError;

/// A single EVM log entry, as returned by `getLogs`.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: String,
    /// `topics[0..4]`; `topics[0]` is the event signature when present.
    pub topics: Vec<String>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: u32,
    pub log_index: u32,
    pub removed: bool,
}

/// A block header, as returned by `getBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: [u8; 32],
    pub timestamp: u64,
}

/// The abstracted EVM JSON-RPC surface.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, AppError>;

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        addresses: &[String],
    ) -> Result<Vec<RawLog>, AppError>;

    async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, AppError>;
}

/// `ChainRpc` backed by a live `alloy` HTTP provider.
pub mod alloy_rpc {
    use std::time::Duration;

    use alloy::primitives::Address;
    use alloy::providers::{DynProvider, Provider, ProviderBuilder};
    use alloy::rpc::types::Filter;
    use async_trait::async_trait;
    use std::str::FromStr;

    use super::{BlockHeader, ChainRpc, RawLog};
    use crate::error::AppError;

    /// `ChainRpc` over a single `alloy` HTTP provider. Holds its own
    /// per-call timeout rather than relying on the provider's transport
    /// defaults — every outbound RPC call gets one.
    pub struct AlloyRpc {
        provider: DynProvider,
        timeout: Duration,
    }

    impl AlloyRpc {
        pub fn connect_http(url: &str, timeout: Duration) -> anyhow::Result<Self> {
            let provider = ProviderBuilder::new().connect_http(url.parse()?).erased();
            Ok(Self { provider, timeout })
        }
    }

    #[async_trait]
    impl ChainRpc for AlloyRpc {
        async fn get_block_number(&self) -> Result<u64, AppError> {
            tokio::time::timeout(self.timeout, self.provider.get_block_number())
                .await
                .map_err(|_| AppError::Rpc("get_block_number timed out".into()))?
                .map_err(|e| AppError::Rpc(e.to_string()))
        }

        async fn get_logs(
            &self,
            from_block: u64,
            to_block: u64,
            addresses: &[String],
        ) -> Result<Vec<RawLog>, AppError> {
            let mut filter = Filter::new().from_block(from_block).to_block(to_block);

            if !addresses.is_empty() {
                let parsed: Result<Vec<Address>, _> =
                    addresses.iter().map(|a| Address::from_str(a)).collect();
                let parsed =
                    parsed.map_err(|e| AppError::Config(format!("invalid address: {e}")))?;
                filter = filter.address(parsed);
            }

            let logs = tokio::time::timeout(self.timeout, self.provider.get_logs(&filter))
                .await
                .map_err(|_| AppError::Rpc("get_logs timed out".into()))?
                .map_err(|e| AppError::Rpc(e.to_string()))?;

            Ok(logs
                .into_iter()
                .map(|log| RawLog {
                    address: format!("{:#x}", log.address()),
                    topics: log.topics().iter().map(|t| format!("{:#x}", t)).collect(),
                    data: log.data().data.to_vec(),
                    block_number: log.block_number.unwrap_or_default(),
                    block_hash: log
                        .block_hash
                        .map(|h| format!("{:#x}", h))
                        .unwrap_or_default(),
                    transaction_hash: log
                        .transaction_hash
                        .map(|h| format!("{:#x}", h))
                        .unwrap_or_default(),
                    transaction_index: log.transaction_index.unwrap_or_default() as u32,
                    log_index: log.log_index.unwrap_or_default() as u32,
                    removed: log.removed,
                })
                .collect())
        }

        async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, AppError> {
            let block = tokio::time::timeout(
                self.timeout,
                self.provider.get_block_by_number(number.into()),
            )
            .await
            .map_err(|_| AppError::Rpc("get_block timed out".into()))?
            .map_err(|e| AppError::Rpc(e.to_string()))?;

            Ok(block.map(|b| BlockHeader {
                number: b.header.number,
                hash: *b.header.hash,
                timestamp: b.header.timestamp,
            }))
        }
    }
}

/// An in-memory `ChainRpc` for unit and integration tests.
#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use std::sync::Mutex;

    use super::{BlockHeader, ChainRpc, RawLog};
    use crate::error::AppError;
    use async_trait::async_trait;

    #[derive(Default)]
    pub struct MockRpc {
        pub head: Mutex<u64>,
        pub blocks: Mutex<Vec<BlockHeader>>,
        pub logs: Mutex<Vec<RawLog>>,
    }

    impl MockRpc {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_head(self, head: u64) -> Self {
            *self.head.lock().unwrap() = head;
            self
        }

        pub fn push_block(&self, header: BlockHeader) {
            self.blocks.lock().unwrap().push(header);
        }

        pub fn push_log(&self, log: RawLog) {
            self.logs.lock().unwrap().push(log);
        }

        /// Replace the recorded hash for `number`, simulating a reorg.
        pub fn set_block_hash(&self, number: u64, hash: [u8; 32]) {
            let mut blocks = self.blocks.lock().unwrap();
            if let Some(b) = blocks.iter_mut().find(|b| b.number == number) {
                b.hash = hash;
            }
        }
    }

    #[async_trait]
    impl ChainRpc for MockRpc {
        async fn get_block_number(&self) -> Result<u64, AppError> {
            Ok(*self.head.lock().unwrap())
        }

        async fn get_logs(
            &self,
            from_block: u64,
            to_block: u64,
            addresses: &[String],
        ) -> Result<Vec<RawLog>, AppError> {
            let logs = self.logs.lock().unwrap();
            Ok(logs
                .iter()
                .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
                .filter(|l| {
                    addresses.is_empty()
                        || addresses
                            .iter()
                            .any(|a| a.eq_ignore_ascii_case(&l.address))
                })
                .cloned()
                .collect())
        }

        async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, AppError> {
            Ok(self
                .blocks
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.number == number)
                .copied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRpc;
    use super::*;

    #[tokio::test]
    async fn mock_rpc_reports_configured_head() {
        let rpc = MockRpc::new().with_head(42);
        assert_eq!(rpc.get_block_number().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn mock_rpc_filters_logs_by_block_range_and_address() {
        let rpc = MockRpc::new();
        rpc.push_log(RawLog {
            address: "0xABC".to_string(),
            topics: vec!["0x01".to_string()],
            data: vec![],
            block_number: 5,
            block_hash: "0x0".to_string(),
            transaction_hash: "0x0".to_string(),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        });
        rpc.push_log(RawLog {
            address: "0xDEF".to_string(),
            topics: vec!["0x01".to_string()],
            data: vec![],
            block_number: 20,
            block_hash: "0x0".to_string(),
            transaction_hash: "0x0".to_string(),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        });

        let logs = rpc
            .get_logs(0, 10, &["0xabc".to_string()])
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 5);
    }
}
