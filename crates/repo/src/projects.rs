//! Projects repository: wraps the generic entity engine and derives
//! `verification_status`, which a handler is never allowed to set directly.

use std::collections::BTreeMap;

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use chainledger_common::types::EventPointer;
use serde_json::Value;
use sqlx::{Postgres, Transaction};

use crate::entity::{Baseline, EntityRepository};

const UPDATE_COLUMNS: &[&str] = &[
    "owner_address",
    "metadata_hash",
    "is_blocked_from_editing",
    "verification_status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Claimed,
    PendingMetadata,
    Unclaimed,
}

impl VerificationStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::PendingMetadata => "pending_metadata",
            Self::Unclaimed => "unclaimed",
        }
    }

    /// `claimed` if owner and metadata hash are both present, `pending_metadata`
    /// if only the owner is present, `unclaimed` otherwise.
    pub fn derive(owner_address: Option<&str>, metadata_hash: Option<&str>) -> Self {
        match (owner_address, metadata_hash) {
            (Some(_), Some(_)) => Self::Claimed,
            (Some(_), None) => Self::PendingMetadata,
            (None, _) => Self::Unclaimed,
        }
    }
}

pub struct ProjectRepository {
    inner: EntityRepository,
}

impl ProjectRepository {
    pub fn new(schema: SchemaName) -> Self {
        Self {
            inner: EntityRepository::new(schema, "projects", UPDATE_COLUMNS),
        }
    }

    /// Upsert a project, rejecting any attempt to set `verification_status`
    /// directly — it is always recomputed from `owner_address`/`metadata_hash`.
    pub async fn upsert_partial(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        owner_address: Option<&str>,
        metadata_hash: Option<&str>,
        is_blocked_from_editing: Option<bool>,
        pointer: EventPointer,
    ) -> Result<(), AppError> {
        let status = VerificationStatus::derive(owner_address, metadata_hash);

        let mut baseline = Baseline::new(account_id, pointer)
            .with_field("verification_status", Value::String(status.as_str().to_string()));
        if let Some(owner) = owner_address {
            baseline = baseline.with_field("owner_address", Value::String(owner.to_string()));
        }
        if let Some(hash) = metadata_hash {
            baseline = baseline.with_field("metadata_hash", Value::String(hash.to_string()));
        }
        if let Some(blocked) = is_blocked_from_editing {
            baseline = baseline.with_field("is_blocked_from_editing", Value::Bool(blocked));
        }

        self.inner.upsert_partial(tx, &baseline).await
    }

    /// Partial update. `verification_status` is stripped from `fields` and
    /// rejected outright if the caller attempted to set it — callers derive
    /// the new value from `owner_address`/`metadata_hash` via [`upsert_partial`]
    /// or [`recompute_verification_status`] instead.
    pub async fn update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        fields: &BTreeMap<String, Value>,
        pointer: EventPointer,
    ) -> Result<(), AppError> {
        if fields.contains_key("verification_status") {
            return Err(AppError::Validation(
                "verification_status is derived and cannot be set directly".to_string(),
            ));
        }
        self.inner.update(tx, account_id, fields, pointer).await
    }

    pub async fn ensure_exists(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        pointer: EventPointer,
    ) -> Result<(), AppError> {
        let baseline = Baseline::new(account_id, pointer)
            .with_field("verification_status", Value::String(VerificationStatus::Unclaimed.as_str().to_string()));
        self.inner.ensure_exists(tx, &baseline).await
    }

    pub async fn find_by_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
    ) -> Result<Option<Value>, AppError> {
        self.inner.find_by_id(tx, account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_status_is_claimed_when_owner_and_hash_present() {
        assert_eq!(
            VerificationStatus::derive(Some("0xabc"), Some("hash")),
            VerificationStatus::Claimed
        );
    }

    #[test]
    fn verification_status_is_pending_with_owner_only() {
        assert_eq!(
            VerificationStatus::derive(Some("0xabc"), None),
            VerificationStatus::PendingMetadata
        );
    }

    #[test]
    fn verification_status_is_unclaimed_without_owner() {
        assert_eq!(VerificationStatus::derive(None, None), VerificationStatus::Unclaimed);
        assert_eq!(VerificationStatus::derive(None, Some("hash")), VerificationStatus::Unclaimed);
    }
}
