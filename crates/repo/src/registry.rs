//! Repository registry: one [`EntityRepository`] per domain table, built
//! against the bound schema, plus the specialized [`ProjectRepository`] and
//! [`SplitsRepository`].

use chainledger_common::schema::SchemaName;

use crate::entity::EntityRepository;
use crate::projects::ProjectRepository;
use crate::splits::SplitsRepository;

pub struct RepositoryRegistry {
    pub projects: ProjectRepository,
    pub drip_lists: EntityRepository,
    pub ecosystem_main_accounts: EntityRepository,
    pub sub_lists: EntityRepository,
    pub linked_identities: EntityRepository,
    pub deadlines: EntityRepository,
    pub splits: SplitsRepository,
}

impl RepositoryRegistry {
    pub fn new(schema: SchemaName) -> Self {
        Self {
            projects: ProjectRepository::new(schema.clone()),
            drip_lists: EntityRepository::new(
                schema.clone(),
                "drip_lists",
                &["owner_address", "is_visible", "name"],
            ),
            ecosystem_main_accounts: EntityRepository::new(
                schema.clone(),
                "ecosystem_main_accounts",
                &["owner_address", "is_visible"],
            ),
            sub_lists: EntityRepository::new(
                schema.clone(),
                "sub_lists",
                &["parent_account_id", "root_account_id"],
            ),
            linked_identities: EntityRepository::new(
                schema.clone(),
                "linked_identities",
                &["owner_address", "identity_type", "is_linked"],
            ),
            deadlines: EntityRepository::new(schema.clone(), "deadlines", &["deadline_timestamp"]),
            splits: SplitsRepository::new(schema),
        }
    }
}
