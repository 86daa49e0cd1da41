//! A thin, read-only HTTP surface over the indexer's own state: a liveness
//! check and the same progress numbers the Progress Monitor logs
//! periodically, for operators who'd rather poll an endpoint than tail logs.

pub mod routes;
pub mod state;
