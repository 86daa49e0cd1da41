//! Handler context: the bag of repositories and chain access a handler
//! receives, bound to the dispatcher's transaction so every repository
//! write shares atomicity with the event-status update.

use std::sync::Arc;

use chainledger_common::rpc::ChainRpc;

use crate::registry::RepositoryRegistry;

/// Passed by reference to every handler invocation. Constructed once per
/// dispatcher transaction; never stored beyond that scope.
pub struct HandlerContext<'a> {
    pub repos: &'a RepositoryRegistry,
    pub rpc: Arc<dyn ChainRpc>,
    pub chain_id: u64,
}

impl<'a> HandlerContext<'a> {
    pub fn new(repos: &'a RepositoryRegistry, rpc: Arc<dyn ChainRpc>, chain_id: u64) -> Self {
        Self {
            repos,
            rpc,
            chain_id,
        }
    }
}
