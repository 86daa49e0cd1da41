use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an event row in the Event Log Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Pending => write!(f, "pending"),
            EventStatus::Processed => write!(f, "processed"),
            EventStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Classification of an account in the splits graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AccountType {
    Project,
    Address,
    DripList,
    EcosystemMainAccount,
    SubList,
    LinkedIdentity,
    Deadline,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountType::Project => "project",
            AccountType::Address => "address",
            AccountType::DripList => "drip_list",
            AccountType::EcosystemMainAccount => "ecosystem_main_account",
            AccountType::SubList => "sub_list",
            AccountType::LinkedIdentity => "linked_identity",
            AccountType::Deadline => "deadline",
        };
        write!(f, "{s}")
    }
}

/// A splits relationship kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum RelationshipType {
    ProjectMaintainer,
    ProjectDependency,
    DripListReceiver,
    EcosystemReceiver,
    SubListLink,
    SubListReceiver,
    IdentityOwner,
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelationshipType::ProjectMaintainer => "project_maintainer",
            RelationshipType::ProjectDependency => "project_dependency",
            RelationshipType::DripListReceiver => "drip_list_receiver",
            RelationshipType::EcosystemReceiver => "ecosystem_receiver",
            RelationshipType::SubListLink => "sub_list_link",
            RelationshipType::SubListReceiver => "sub_list_receiver",
            RelationshipType::IdentityOwner => "identity_owner",
        };
        write!(f, "{s}")
    }
}

/// `(block_number, tx_index, log_index)` — identifies the last event that
/// mutated an entity. Ordered lexicographically by field declaration order,
/// matching ascending dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventPointer {
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
}

impl EventPointer {
    pub const GENESIS: EventPointer = EventPointer {
        block_number: 0,
        tx_index: 0,
        log_index: 0,
    };

    pub fn new(block_number: u64, tx_index: u32, log_index: u32) -> Self {
        Self {
            block_number,
            tx_index,
            log_index,
        }
    }
}

impl std::fmt::Display for EventPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.block_number, self.tx_index, self.log_index
        )
    }
}

/// A decoded on-chain event, ready to be enqueued in the Event Log Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub chain_id: u64,
    pub pointer: EventPointer,
    pub block_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub contract_address: String,
    pub event_name: String,
    /// topic0, the event signature hash.
    pub event_sig: String,
    /// Decoded name→value map. Integers are serialized losslessly as strings.
    pub args: serde_json::Value,
}

/// A stored row in the Event Log Store, including dispatch status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub chain_id: u64,
    pub pointer: EventPointer,
    pub block_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub contract_address: String,
    pub event_name: String,
    pub event_sig: String,
    pub args: serde_json::Value,
    pub status: EventStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A single recorded block hash, used for reorg detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHashRecord {
    pub block_number: u64,
    pub block_hash: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_pointer_orders_lexicographically() {
        let a = EventPointer::new(10, 0, 5);
        let b = EventPointer::new(10, 1, 0);
        let c = EventPointer::new(11, 0, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn event_pointer_equal_fields_are_equal() {
        assert_eq!(EventPointer::new(5, 1, 2), EventPointer::new(5, 1, 2));
    }
}
