//! `DecoderRegistry`: turns a set of `EventRegistration`s into the two
//! lookup tables the fetch loop needs — one keyed by `(address, topic0)` for
//! decoding a raw log, one keyed by `(address, event_name)` for anything
//! that wants to resolve a registration by name (the dispatcher, tests).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use alloy::primitives::B256;
use chainledger_common::error::AppError;
use chainledger_common::rpc::RawLog;
use chainledger_common::schema::SchemaName;
use chainledger_common::types::{DecodedEvent, EventPointer};
use chrono::{DateTime, Utc};

use crate::outcome::{DecodeOutcome, SkipReason};
use crate::registration::EventRegistration;

pub struct DecoderRegistry {
    by_topic: HashMap<(String, B256), EventRegistration>,
    by_name: HashMap<String, HashMap<String, EventRegistration>>,
    binding: Mutex<Option<(SchemaName, u64)>>,
}

impl DecoderRegistry {
    pub fn new(registrations: Vec<EventRegistration>) -> Self {
        let mut by_topic = HashMap::new();
        let mut by_name: HashMap<String, HashMap<String, EventRegistration>> = HashMap::new();

        for reg in registrations {
            by_name
                .entry(reg.contract_address.clone())
                .or_default()
                .insert(reg.event_name.clone(), reg.clone());
            by_topic.insert((reg.contract_address.clone(), reg.topic0), reg);
        }

        Self {
            by_topic,
            by_name,
            binding: Mutex::new(None),
        }
    }

    /// Addresses this registry recognizes, for the Fetcher's `getLogs`
    /// address filter.
    pub fn known_addresses(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    /// Bind this registry to the `(schema, chain_id)` pair it indexes for the
    /// rest of the process's lifetime. A schema may only ever be bound to one
    /// chain; a conflicting rebind is a configuration error the caller
    /// should treat as fatal.
    pub fn bind(&self, schema: SchemaName, chain_id: u64) -> Result<(), AppError> {
        let mut guard = self.binding.lock().expect("binding mutex poisoned");
        match guard.as_ref() {
            None => {
                *guard = Some((schema, chain_id));
                Ok(())
            }
            Some((bound_schema, bound_chain)) if *bound_schema == schema && *bound_chain == chain_id => {
                Ok(())
            }
            Some((bound_schema, bound_chain)) => Err(AppError::Config(format!(
                "schema '{schema}' already bound to chain {bound_chain}, cannot rebind to chain {chain_id} (previously bound as '{bound_schema}')"
            ))),
        }
    }

    pub fn resolve_by_name(&self, contract_address: &str, event_name: &str) -> Option<&EventRegistration> {
        self.by_name
            .get(&contract_address.to_lowercase())
            .and_then(|events| events.get(event_name))
    }

    /// Decode a raw log into a `DecodedEvent`, or report why it couldn't be.
    pub fn decode(&self, log: &RawLog, chain_id: u64, block_timestamp: DateTime<Utc>) -> DecodeOutcome {
        let Some(topic0_raw) = log.topics.first() else {
            return DecodeOutcome::Skipped(SkipReason::MissingLogFields);
        };
        let Ok(topic0) = B256::from_str(topic0_raw) else {
            return DecodeOutcome::Skipped(SkipReason::MissingLogFields);
        };
        let address = log.address.to_lowercase();

        let Some(registration) = self.by_topic.get(&(address.clone(), topic0)) else {
            return DecodeOutcome::Skipped(SkipReason::UnknownEvent);
        };

        if registration.event_name.is_empty() {
            return DecodeOutcome::Skipped(SkipReason::MissingEventName);
        }

        let Some(decode_fn) = registration.decode.as_ref() else {
            return DecodeOutcome::MissingHandler(registration.event_name.clone());
        };

        match decode_fn(log) {
            Ok(args) => {
                tracing::debug!(
                    contract_address = %address,
                    event_name = %registration.event_name,
                    "decoded event"
                );
                DecodeOutcome::Decoded(DecodedEvent {
                    chain_id,
                    pointer: EventPointer::new(log.block_number, log.transaction_index, log.log_index),
                    block_hash: log.block_hash.clone(),
                    block_timestamp,
                    transaction_hash: log.transaction_hash.clone(),
                    contract_address: address,
                    event_name: registration.event_name.clone(),
                    event_sig: format!("{topic0:#x}"),
                    args,
                })
            }
            Err(msg) => {
                let reason = SkipReason::DecodeError(format!("{msg} (data={})", hex::encode(&log.data)));
                tracing::warn!(contract_address = %address, %reason, "decode_error");
                DecodeOutcome::Skipped(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_log(address: &str, topic0: B256) -> RawLog {
        RawLog {
            address: address.to_string(),
            topics: vec![format!("{topic0:#x}")],
            data: vec![1, 2, 3],
            block_number: 100,
            block_hash: "0xblock".to_string(),
            transaction_hash: "0xtx".to_string(),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        }
    }

    fn topic(byte: u8) -> B256 {
        B256::from([byte; 32])
    }

    #[test]
    fn unknown_address_or_topic_is_skipped() {
        let registry = DecoderRegistry::new(vec![EventRegistration::new(
            "0xABC",
            "AccountMetadataEmitted",
            topic(1),
        )]);
        let log = sample_log("0xdef", topic(9));
        assert_eq!(
            registry.decode(&log, 14, Utc::now()),
            DecodeOutcome::Skipped(SkipReason::UnknownEvent)
        );
    }

    #[test]
    fn registered_event_without_decode_fn_is_missing_handler() {
        let registry = DecoderRegistry::new(vec![EventRegistration::new(
            "0xabc",
            "AccountMetadataEmitted",
            topic(1),
        )]);
        let log = sample_log("0xABC", topic(1));
        assert_eq!(
            registry.decode(&log, 14, Utc::now()),
            DecodeOutcome::MissingHandler("AccountMetadataEmitted".to_string())
        );
    }

    #[test]
    fn decode_fn_failure_is_a_decode_error() {
        let reg = EventRegistration::new("0xabc", "AccountMetadataEmitted", topic(1))
            .with_decode_fn(std::sync::Arc::new(|_log| Err("bad abi".to_string())));
        let registry = DecoderRegistry::new(vec![reg]);
        let log = sample_log("0xabc", topic(1));
        match registry.decode(&log, 14, Utc::now()) {
            DecodeOutcome::Skipped(SkipReason::DecodeError(msg)) => {
                assert!(msg.contains("bad abi"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn decode_fn_success_produces_a_decoded_event() {
        let reg = EventRegistration::new("0xabc", "AccountMetadataEmitted", topic(1))
            .with_decode_fn(std::sync::Arc::new(|_log| Ok(json!({"accountId": "1"}))));
        let registry = DecoderRegistry::new(vec![reg]);
        let log = sample_log("0xabc", topic(1));
        match registry.decode(&log, 14, Utc::now()) {
            DecodeOutcome::Decoded(event) => {
                assert_eq!(event.event_name, "AccountMetadataEmitted");
                assert_eq!(event.contract_address, "0xabc");
            }
            other => panic!("expected decoded event, got {other:?}"),
        }
    }

    #[test]
    fn rebinding_to_a_different_chain_is_rejected() {
        let registry = DecoderRegistry::new(vec![]);
        let schema = SchemaName::parse("flare_mainnet").unwrap();
        registry.bind(schema.clone(), 14).unwrap();
        assert!(registry.bind(schema, 15).is_err());
    }

    #[test]
    fn rebinding_to_the_same_chain_is_idempotent() {
        let registry = DecoderRegistry::new(vec![]);
        let schema = SchemaName::parse("flare_mainnet").unwrap();
        registry.bind(schema.clone(), 14).unwrap();
        assert!(registry.bind(schema, 14).is_ok());
    }
}
