//! Generic entity repository.
//!
//! The domain tables themselves (`projects`, `drip_lists`, `sub_lists`, …)
//! are external to this crate — only their shape (an account id, an event
//! pointer, and a bag of mutable columns) is known here. Rather than hand
//! one near-identical struct per table, a single engine is parameterized by
//! table name and an update-column allow-list, and every entity-specific
//! wrapper in this crate sits on top of it.

use std::collections::BTreeMap;

use chainledger_common::error::AppError;
use chainledger_common::schema::SchemaName;
use chainledger_common::types::EventPointer;
use serde_json::Value;
use sqlx::{Postgres, Transaction};

/// The full row state for an insert-or-update: the account id, the columns
/// beyond the id/pointer/timestamps, and the event pointer that produced it.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub account_id: String,
    pub fields: BTreeMap<String, Value>,
    pub pointer: EventPointer,
}

impl Baseline {
    pub fn new(account_id: impl Into<String>, pointer: EventPointer) -> Self {
        Self {
            account_id: account_id.into(),
            fields: BTreeMap::new(),
            pointer,
        }
    }

    pub fn with_field(mut self, column: &str, value: Value) -> Self {
        self.fields.insert(column.to_string(), value);
        self
    }
}

/// Columns no caller may write directly: the primary key and the two
/// timestamps the repository manages itself.
const RESERVED_COLUMNS: &[&str] = &["account_id", "created_at", "updated_at"];

pub struct EntityRepository {
    schema: SchemaName,
    table: &'static str,
    update_columns: &'static [&'static str],
}

impl EntityRepository {
    pub fn new(schema: SchemaName, table: &'static str, update_columns: &'static [&'static str]) -> Self {
        Self {
            schema,
            table,
            update_columns,
        }
    }

    fn qualified_table(&self) -> String {
        self.schema.table(self.table)
    }

    fn validate_columns(&self, fields: &BTreeMap<String, Value>) -> Result<(), AppError> {
        for column in fields.keys() {
            if RESERVED_COLUMNS.contains(&column.as_str()) {
                return Err(AppError::Validation(format!(
                    "column '{column}' is immutable and cannot be set by a handler"
                )));
            }
            if !self.update_columns.contains(&column.as_str()) {
                return Err(AppError::Validation(format!(
                    "column '{column}' is not writable on table '{}'",
                    self.table
                )));
            }
        }
        Ok(())
    }

    /// Insert-or-update with a fixed set of `update_columns`. Replayable:
    /// reapplying the same baseline is a no-op once the pointer guard fires.
    pub async fn upsert_partial(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        baseline: &Baseline,
    ) -> Result<(), AppError> {
        self.validate_columns(&baseline.fields)?;
        let table = self.qualified_table();

        let mut columns = vec!["account_id".to_string()];
        let mut placeholders = vec!["$1".to_string()];
        let mut values: Vec<&Value> = Vec::new();
        let mut idx = 2;
        for (column, value) in &baseline.fields {
            columns.push(column.clone());
            placeholders.push(format!("${idx}"));
            values.push(value);
            idx += 1;
        }
        columns.push("last_event_block".to_string());
        columns.push("last_event_tx_index".to_string());
        columns.push("last_event_log_index".to_string());
        columns.push("created_at".to_string());
        columns.push("updated_at".to_string());
        placeholders.push(format!("${idx}"));
        let block_idx = idx;
        idx += 1;
        placeholders.push(format!("${idx}"));
        idx += 1;
        placeholders.push(format!("${idx}"));
        placeholders.push("now()".to_string());
        placeholders.push("now()".to_string());

        let set_clause: Vec<String> = baseline
            .fields
            .keys()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .chain(std::iter::once("updated_at = now()".to_string()))
            .chain([
                "last_event_block = EXCLUDED.last_event_block".to_string(),
                "last_event_tx_index = EXCLUDED.last_event_tx_index".to_string(),
                "last_event_log_index = EXCLUDED.last_event_log_index".to_string(),
            ])
            .collect();

        let query_str = format!(
            r#"
            INSERT INTO {table} ({columns})
            VALUES ({placeholders})
            ON CONFLICT (account_id) DO UPDATE SET {set}
            WHERE ({table}.last_event_block, {table}.last_event_tx_index, {table}.last_event_log_index)
                  < (EXCLUDED.last_event_block, EXCLUDED.last_event_tx_index, EXCLUDED.last_event_log_index)
            "#,
            columns = columns.join(", "),
            placeholders = placeholders.join(", "),
            set = set_clause.join(", "),
        );

        let mut q = sqlx::query(&query_str).bind(&baseline.account_id);
        for value in values {
            q = q.bind(value);
        }
        q = q
            .bind(to_i64(baseline.pointer.block_number, block_idx)?)
            .bind(baseline.pointer.tx_index as i32)
            .bind(baseline.pointer.log_index as i32);

        q.execute(&mut **tx).await?;
        Ok(())
    }

    /// Update only the provided fields, rejecting anything outside the
    /// allow-list. The pointer guard makes a strictly-older write a no-op.
    pub async fn update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        fields: &BTreeMap<String, Value>,
        pointer: EventPointer,
    ) -> Result<(), AppError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.validate_columns(fields)?;
        let table = self.qualified_table();

        let mut set_clauses = Vec::new();
        let mut idx = 1;
        for column in fields.keys() {
            set_clauses.push(format!("{column} = ${idx}"));
            idx += 1;
        }
        let account_idx = idx;
        idx += 1;
        let block_idx = idx;
        idx += 1;
        let tx_idx = idx;
        idx += 1;
        let log_idx = idx;

        let query_str = format!(
            r#"
            UPDATE {table}
            SET {set}, updated_at = now(),
                last_event_block = ${block_idx}, last_event_tx_index = ${tx_idx}, last_event_log_index = ${log_idx}
            WHERE account_id = ${account_idx}
              AND (last_event_block, last_event_tx_index, last_event_log_index) < (${block_idx}, ${tx_idx}, ${log_idx})
            "#,
            set = set_clauses.join(", "),
        );

        let mut q = sqlx::query(&query_str);
        for value in fields.values() {
            q = q.bind(value);
        }
        q = q
            .bind(account_id)
            .bind(to_i64(pointer.block_number, block_idx)?)
            .bind(pointer.tx_index as i32)
            .bind(pointer.log_index as i32);

        q.execute(&mut **tx).await?;
        Ok(())
    }

    /// Insert-if-absent. A re-encounter is a bare reference: it never
    /// updates data or advances the event pointer.
    pub async fn ensure_exists(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        baseline: &Baseline,
    ) -> Result<(), AppError> {
        self.validate_columns(&baseline.fields)?;
        let table = self.qualified_table();

        let mut columns = vec!["account_id".to_string()];
        let mut placeholders = vec!["$1".to_string()];
        let mut values: Vec<&Value> = Vec::new();
        let mut idx = 2;
        for (column, value) in &baseline.fields {
            columns.push(column.clone());
            placeholders.push(format!("${idx}"));
            values.push(value);
            idx += 1;
        }
        columns.push("last_event_block".to_string());
        columns.push("last_event_tx_index".to_string());
        columns.push("last_event_log_index".to_string());
        columns.push("created_at".to_string());
        columns.push("updated_at".to_string());
        placeholders.push(format!("${idx}"));
        idx += 1;
        placeholders.push(format!("${idx}"));
        idx += 1;
        placeholders.push(format!("${idx}"));
        placeholders.push("now()".to_string());
        placeholders.push("now()".to_string());

        let query_str = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) ON CONFLICT (account_id) DO NOTHING",
            columns = columns.join(", "),
            placeholders = placeholders.join(", "),
        );

        let mut q = sqlx::query(&query_str).bind(&baseline.account_id);
        for value in values {
            q = q.bind(value);
        }
        q = q
            .bind(to_i64(baseline.pointer.block_number, idx)?)
            .bind(baseline.pointer.tx_index as i32)
            .bind(baseline.pointer.log_index as i32);

        q.execute(&mut **tx).await?;
        Ok(())
    }

    /// Point lookup, returning the full row as a JSON object, or `None`.
    /// `to_jsonb` sidesteps needing to know every domain column's type.
    pub async fn find_by_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let table = self.qualified_table();
        let row: Option<(Value,)> = sqlx::query_as(&format!(
            "SELECT to_jsonb(t) FROM {table} t WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|(json,)| json))
    }
}

fn to_i64(value: u64, param: usize) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| {
        AppError::Validation(format!("event pointer block {value} (param ${param}) does not fit in i64"))
    })
}
