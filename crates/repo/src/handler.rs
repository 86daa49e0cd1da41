//! The handler contract and registry.
//!
//! A handler maps one decoded event to repository mutations, invoked inside
//! the dispatcher's transaction. Resolution is by `(contract_address, event_name)`,
//! both lowercased at registration and lookup time to match the decoder's
//! own normalization.

use std::collections::HashMap;

use async_trait::async_trait;
use chainledger_common::error::AppError;
use chainledger_common::types::EventRecord;
use sqlx::{Postgres, Transaction};

use crate::context::HandlerContext;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &EventRecord,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), AppError>;
}

pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, address: &str, event_name: &str, handler: Box<dyn Handler>) {
        self.handlers
            .insert((address.to_lowercase(), event_name.to_string()), handler);
    }

    /// Resolve the handler for a decoded event. `None` means `no_handler` —
    /// the dispatcher fails the event rather than skipping it.
    pub fn resolve(&self, contract_address: &str, event_name: &str) -> Option<&dyn Handler> {
        self.handlers
            .get(&(contract_address.to_lowercase(), event_name.to_string()))
            .map(|h| h.as_ref())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
