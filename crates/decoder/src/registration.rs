//! What the indexer tells the decoder about a contract at startup.
//!
//! The decoder never ships an ABI or a catalog of addresses itself — those
//! come from the caller's chain configuration, which is out of scope here.
//! `EventRegistration` is the narrow interface between that external catalog
//! and this crate's dispatch tables.

use std::sync::Arc;

use alloy::primitives::B256;
use chainledger_common::rpc::RawLog;

/// Decodes one log's `data`/`topics` into the self-describing args map a
/// `DecodedEvent` carries. Supplied by the caller, since it is the only
/// party that knows the ABI.
pub type DecodeFn = Arc<dyn Fn(&RawLog) -> Result<serde_json::Value, String> + Send + Sync>;

/// One `(contract address, event)` pair the decoder should recognize.
///
/// `decode` is `None` for events the caller wants to recognize as "known"
/// without yet having wired up argument decoding — the dispatcher reports
/// those as `missing_handler` rather than `unknown_event`.
#[derive(Clone)]
pub struct EventRegistration {
    pub contract_address: String,
    pub event_name: String,
    pub topic0: B256,
    pub decode: Option<DecodeFn>,
}

impl EventRegistration {
    pub fn new(contract_address: impl Into<String>, event_name: impl Into<String>, topic0: B256) -> Self {
        Self {
            contract_address: contract_address.into().to_lowercase(),
            event_name: event_name.into(),
            topic0,
            decode: None,
        }
    }

    pub fn with_decode_fn(mut self, decode: DecodeFn) -> Self {
        self.decode = Some(decode);
        self
    }
}
