//! Event Decoder: turns a raw chain log into a self-describing event, or
//! reports why it couldn't.
//!
//! Contract addresses, ABIs, and the mapping from topic to event name are
//! all supplied by the caller at startup — this crate owns only the lookup
//! tables and the decode decision tree, not any chain-specific catalog.

pub mod outcome;
pub mod registration;
pub mod registry;

pub use outcome::{DecodeOutcome, SkipReason};
pub use registration::{DecodeFn, EventRegistration};
pub use registry::DecoderRegistry;
