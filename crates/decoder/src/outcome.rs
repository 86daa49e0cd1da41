use chainledger_common::types::DecodedEvent;

/// Why a raw log was not turned into a decoded event. All variants are
/// logged at WARN and do not block fetcher progress — a monitored
/// contract emitting a log this decoder doesn't recognize is schema drift,
/// not a fetcher error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingLogFields,
    UnknownEvent,
    DecodeError(String),
    MissingEventName,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLogFields => write!(f, "missing_log_fields"),
            Self::UnknownEvent => write!(f, "unknown_event"),
            Self::DecodeError(msg) => write!(f, "decode_error: {msg}"),
            Self::MissingEventName => write!(f, "missing_event_name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded(DecodedEvent),
    Skipped(SkipReason),
    /// The `(address, topic0)` is registered with an event name but no
    /// decode function was attached to it.
    MissingHandler(String),
}
