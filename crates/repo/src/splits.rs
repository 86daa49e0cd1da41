//! Splits rule matrix and the splits receiver repository.

use std::collections::BTreeMap;

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use chainledger_common::types::{AccountType, EventPointer, RelationshipType};
use serde_json::Value;
use sqlx::{Postgres, Transaction};

pub const MIN_WEIGHT: i64 = 1;
pub const MAX_WEIGHT: i64 = 1_000_000;

/// A single proposed splits edge, not yet validated against the matrix.
#[derive(Debug, Clone)]
pub struct SplitsReceiver {
    pub sender_account_id: String,
    pub sender_account_type: AccountType,
    pub receiver_account_id: String,
    pub receiver_account_type: AccountType,
    pub relationship_type: RelationshipType,
    pub weight: i64,
    pub splits_to_repo_driver_sub_account: Option<bool>,
}

/// Check `(sender_type, receiver_type, relationship_type)` against the
/// exhaustive table of valid combinations.
pub fn validate_triple(
    sender: AccountType,
    receiver: AccountType,
    relationship: RelationshipType,
) -> Result<(), AppError> {
    use AccountType::*;
    use RelationshipType::*;

    let allowed = matches!(
        (sender, receiver, relationship),
        (Project, Address, ProjectMaintainer)
            | (Project, Project, ProjectDependency)
            | (Project, Address, ProjectDependency)
            | (Project, DripList, ProjectDependency)
            | (Project, LinkedIdentity, ProjectDependency)
            | (Project, Deadline, ProjectDependency)
            | (DripList, Address, DripListReceiver)
            | (DripList, DripList, DripListReceiver)
            | (DripList, Project, DripListReceiver)
            | (DripList, LinkedIdentity, DripListReceiver)
            | (DripList, Deadline, DripListReceiver)
            | (EcosystemMainAccount, Project, EcosystemReceiver)
            | (EcosystemMainAccount, LinkedIdentity, EcosystemReceiver)
            | (EcosystemMainAccount, Deadline, EcosystemReceiver)
            | (EcosystemMainAccount, SubList, SubListLink)
            | (SubList, Address, SubListReceiver)
            | (SubList, DripList, SubListReceiver)
            | (SubList, Project, SubListReceiver)
            | (SubList, LinkedIdentity, SubListReceiver)
            | (SubList, Deadline, SubListLink)
            | (SubList, SubList, SubListLink)
            | (LinkedIdentity, Address, IdentityOwner)
    );

    if allowed {
        Ok(())
    } else {
        Err(AppError::SplitsRuleViolation(format!(
            "invalid split combination: ({sender}, {receiver}, {relationship})"
        )))
    }
}

fn validate_weight(weight: i64) -> Result<(), AppError> {
    if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        return Err(AppError::Validation(format!(
            "weight {weight} outside the allowed range [{MIN_WEIGHT}, {MAX_WEIGHT}]"
        )));
    }
    Ok(())
}

pub struct SplitsRepository {
    schema: SchemaName,
}

impl SplitsRepository {
    pub fn new(schema: SchemaName) -> Self {
        Self { schema }
    }

    /// Atomically replace a sender's entire receiver set: delete existing
    /// rows, then bulk-insert the new set. Each triple is validated against
    /// the splits rule matrix before any row is written.
    pub async fn replace_all(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sender_account_id: &str,
        receivers: &[SplitsReceiver],
        block_timestamp: chrono::DateTime<chrono::Utc>,
        pointer: EventPointer,
    ) -> Result<(), AppError> {
        for receiver in receivers {
            if receiver.sender_account_id != sender_account_id {
                return Err(AppError::Validation(format!(
                    "receiver sender_account_id '{}' does not match supplied sender '{sender_account_id}'",
                    receiver.sender_account_id
                )));
            }
            validate_triple(
                receiver.sender_account_type,
                receiver.receiver_account_type,
                receiver.relationship_type,
            )?;
            validate_weight(receiver.weight)?;
        }

        let table = self.schema.table("splits_receivers");

        sqlx::query(&format!("DELETE FROM {table} WHERE sender_account_id = $1"))
            .bind(sender_account_id)
            .execute(&mut **tx)
            .await?;

        for receiver in receivers {
            sqlx::query(&format!(
                r#"
                INSERT INTO {table}
                    (sender_account_id, sender_account_type, receiver_account_id, receiver_account_type,
                     relationship_type, weight, block_timestamp, splits_to_repo_driver_sub_account,
                     last_event_block, last_event_tx_index, last_event_log_index, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), now())
                ON CONFLICT (sender_account_id, receiver_account_id, relationship_type) DO UPDATE SET
                    weight = EXCLUDED.weight,
                    block_timestamp = EXCLUDED.block_timestamp,
                    splits_to_repo_driver_sub_account = EXCLUDED.splits_to_repo_driver_sub_account,
                    last_event_block = EXCLUDED.last_event_block,
                    last_event_tx_index = EXCLUDED.last_event_tx_index,
                    last_event_log_index = EXCLUDED.last_event_log_index,
                    updated_at = now()
                "#
            ))
            .bind(&receiver.sender_account_id)
            .bind(receiver.sender_account_type.to_string())
            .bind(&receiver.receiver_account_id)
            .bind(receiver.receiver_account_type.to_string())
            .bind(receiver.relationship_type.to_string())
            .bind(receiver.weight)
            .bind(block_timestamp)
            .bind(receiver.splits_to_repo_driver_sub_account)
            .bind(to_i64(pointer.block_number)?)
            .bind(pointer.tx_index as i32)
            .bind(pointer.log_index as i32)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    pub async fn find_by_sender(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sender_account_id: &str,
    ) -> Result<Vec<Value>, AppError> {
        let table = self.schema.table("splits_receivers");
        let rows: Vec<(Value,)> = sqlx::query_as(&format!(
            "SELECT to_jsonb(t) FROM {table} t WHERE sender_account_id = $1"
        ))
        .bind(sender_account_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(|(v,)| v).collect())
    }
}

fn to_i64(value: u64) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{value} does not fit in i64")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccountType::*;
    use RelationshipType::*;

    #[test]
    fn matrix_accepts_documented_triples() {
        assert!(validate_triple(Project, Address, ProjectMaintainer).is_ok());
        assert!(validate_triple(Project, DripList, ProjectDependency).is_ok());
        assert!(validate_triple(EcosystemMainAccount, SubList, SubListLink).is_ok());
        assert!(validate_triple(SubList, Deadline, SubListLink).is_ok());
        assert!(validate_triple(LinkedIdentity, Address, IdentityOwner).is_ok());
    }

    #[test]
    fn matrix_rejects_undocumented_triples() {
        assert!(validate_triple(EcosystemMainAccount, Address, EcosystemReceiver).is_err());
        assert!(validate_triple(Address, Project, ProjectMaintainer).is_err());
        assert!(validate_triple(LinkedIdentity, Project, IdentityOwner).is_err());
    }

    #[test]
    fn weight_bounds_are_enforced() {
        assert!(validate_weight(0).is_err());
        assert!(validate_weight(1).is_ok());
        assert!(validate_weight(1_000_000).is_ok());
        assert!(validate_weight(1_000_001).is_err());
    }
}
