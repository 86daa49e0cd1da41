//! A small set of representative handlers exercising the dispatcher
//! contract, the event-pointer guard, and the splits rule matrix end to end.
//! The full catalog of per-event-type business rules is outside this crate's
//! concern — each handler here models the dispatcher/repository contract,
//! not every on-chain event this indexer could ever be pointed at.

use async_trait::async_trait;
use chainledger_common::error::AppError;
use chainledger_common::types::{AccountType, EventPointer, EventRecord, RelationshipType};

use crate::context::HandlerContext;
use crate::handler::Handler;
use crate::splits::SplitsReceiver;

fn event_pointer(event: &EventRecord) -> EventPointer {
    event.pointer
}

fn arg_str<'a>(event: &'a EventRecord, key: &str) -> Result<&'a str, AppError> {
    event
        .args
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Decode(format!("event '{}' missing string arg '{key}'", event.event_name)))
}

/// `AccountMetadataEmitted(accountId, metadataHash)` — updates a project's
/// metadata hash, which feeds `verification_status` derivation.
pub struct AccountMetadataEmittedHandler;

#[async_trait]
impl Handler for AccountMetadataEmittedHandler {
    async fn handle(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: &EventRecord,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), AppError> {
        let account_id = arg_str(event, "account_id")?;
        let metadata_hash = arg_str(event, "metadata_hash")?;

        let existing = ctx.repos.projects.find_by_id(tx, account_id).await?;
        let owner_address = existing
            .as_ref()
            .and_then(|row| row.get("owner_address"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        ctx.repos
            .projects
            .upsert_partial(
                tx,
                account_id,
                owner_address.as_deref(),
                Some(metadata_hash),
                None,
                event_pointer(event),
            )
            .await
    }
}

/// `SplitsSet(accountId, receivers[])` — atomically replaces the sender's
/// entire splits receiver set within this transaction.
pub struct SplitsSetHandler;

#[async_trait]
impl Handler for SplitsSetHandler {
    async fn handle(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: &EventRecord,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), AppError> {
        let sender_account_id = arg_str(event, "account_id")?;
        let sender_account_type = parse_account_type(arg_str(event, "account_type")?)?;

        let receivers_json = event
            .args
            .get("receivers")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::Decode("SplitsSet missing 'receivers' array".to_string()))?;

        let mut receivers = Vec::with_capacity(receivers_json.len());
        for raw in receivers_json {
            let receiver_account_id = raw
                .get("account_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AppError::Decode("splits receiver missing account_id".to_string()))?
                .to_string();
            let receiver_account_type = parse_account_type(
                raw.get("account_type")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AppError::Decode("splits receiver missing account_type".to_string()))?,
            )?;
            let relationship_type = parse_relationship_type(
                raw.get("relationship_type")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AppError::Decode("splits receiver missing relationship_type".to_string()))?,
            )?;
            let weight = raw
                .get("weight")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| AppError::Decode("splits receiver missing weight".to_string()))?;

            receivers.push(SplitsReceiver {
                sender_account_id: sender_account_id.to_string(),
                sender_account_type,
                receiver_account_id,
                receiver_account_type,
                relationship_type,
                weight,
                splits_to_repo_driver_sub_account: raw
                    .get("splits_to_repo_driver_sub_account")
                    .and_then(|v| v.as_bool()),
            });
        }

        ctx.repos
            .splits
            .replace_all(tx, sender_account_id, &receivers, event.block_timestamp, event_pointer(event))
            .await
    }
}

fn parse_account_type(raw: &str) -> Result<AccountType, AppError> {
    match raw {
        "project" => Ok(AccountType::Project),
        "address" => Ok(AccountType::Address),
        "drip_list" => Ok(AccountType::DripList),
        "ecosystem_main_account" => Ok(AccountType::EcosystemMainAccount),
        "sub_list" => Ok(AccountType::SubList),
        "linked_identity" => Ok(AccountType::LinkedIdentity),
        "deadline" => Ok(AccountType::Deadline),
        other => Err(AppError::Decode(format!("unrecognized account_type '{other}'"))),
    }
}

fn parse_relationship_type(raw: &str) -> Result<RelationshipType, AppError> {
    match raw {
        "project_maintainer" => Ok(RelationshipType::ProjectMaintainer),
        "project_dependency" => Ok(RelationshipType::ProjectDependency),
        "drip_list_receiver" => Ok(RelationshipType::DripListReceiver),
        "ecosystem_receiver" => Ok(RelationshipType::EcosystemReceiver),
        "sub_list_link" => Ok(RelationshipType::SubListLink),
        "sub_list_receiver" => Ok(RelationshipType::SubListReceiver),
        "identity_owner" => Ok(RelationshipType::IdentityOwner),
        other => Err(AppError::Decode(format!("unrecognized relationship_type '{other}'"))),
    }
}
