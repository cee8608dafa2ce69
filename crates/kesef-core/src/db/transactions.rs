//! Transaction operations

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::Database;
use crate::error::Result;
use crate::models::{Category, SourceFormat, Transaction, TransactionPatch};
use crate::store::TransactionStore;

const COLUMNS: &str = "identity_hash, date, amount, description, category, sub_category, spender,
                       source_file, uploaded_from, ref_id, bank_category, transaction_type,
                       not_duplicate_of, duplicate_of, is_duplicate, uploaded_at";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

/// Column/value pairs for the fields a patch sets
fn patch_assignments(patch: &TransactionPatch) -> Result<Vec<(&'static str, Value)>> {
    let text = |v: &Option<String>| v.clone().map(Value::Text);

    let mut sets = Vec::new();
    let mut push = |column: &'static str, value: Option<Value>| {
        if let Some(value) = value {
            sets.push((column, value));
        }
    };

    push("description", text(&patch.description));
    push("category", patch.category.map(|c| Value::Text(c.as_str().to_string())));
    push("sub_category", text(&patch.sub_category));
    push("spender", text(&patch.spender));
    push("uploaded_from", text(&patch.uploaded_from));
    push("bank_category", text(&patch.bank_category));
    push("transaction_type", text(&patch.transaction_type));
    let not_duplicate_of = match &patch.not_duplicate_of {
        Some(set) => Some(Value::Text(serde_json::to_string(set)?)),
        None => None,
    };
    push("not_duplicate_of", not_duplicate_of);
    push("duplicate_of", text(&patch.duplicate_of));
    push("is_duplicate", patch.is_duplicate.map(|b| Value::Integer(b as i64)));

    Ok(sets)
}

/// Apply a patch on an open connection (or SQL transaction)
fn apply_patch(conn: &Connection, identity_hash: &str, patch: &TransactionPatch) -> Result<bool> {
    let sets = patch_assignments(patch)?;
    if sets.is_empty() {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM transactions WHERE identity_hash = ?",
                params![identity_hash],
                |row| row.get(0),
            )
            .optional()?;
        return Ok(exists.is_some());
    }

    let assignments = sets
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE transactions SET {} WHERE identity_hash = ?",
        assignments
    );

    let mut values: Vec<Value> = sets.into_iter().map(|(_, v)| v).collect();
    values.push(Value::Text(identity_hash.to_string()));

    let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(changed > 0)
}

impl Database {
    /// Helper to convert a row to Transaction (column order as in `COLUMNS`)
    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get(1)?;
        let category_str: String = row.get(4)?;
        let source_str: String = row.get(7)?;
        let not_duplicate_str: String = row.get(12)?;
        let is_duplicate: i64 = row.get(14)?;
        let uploaded_at_str: Option<String> = row.get(15)?;

        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| conversion_error(1, e))?;
        let source_file: SourceFormat = source_str.parse().map_err(|e: String| conversion_error(7, e))?;
        let not_duplicate_of: BTreeSet<String> = serde_json::from_str(&not_duplicate_str)
            .map_err(|e| conversion_error(12, e))?;

        Ok(Transaction {
            identity_hash: row.get(0)?,
            date,
            amount: row.get(2)?,
            description: row.get(3)?,
            // Categories renamed or removed since the row was written read as uncategorized
            category: category_str.parse().unwrap_or(Category::Uncategorized),
            sub_category: row.get(5)?,
            spender: row.get(6)?,
            source_file,
            uploaded_from: row.get(8)?,
            ref_id: row.get(9)?,
            bank_category: row.get(10)?,
            transaction_type: row.get(11)?,
            not_duplicate_of,
            duplicate_of: row.get(13)?,
            is_duplicate: is_duplicate != 0,
            uploaded_at: uploaded_at_str.and_then(|s| parse_datetime(&s)),
        })
    }

    fn select(&self, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions {} ORDER BY date, identity_hash",
            COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| Self::row_to_transaction(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Get a single transaction by identity hash
    pub fn get_transaction(&self, identity_hash: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM transactions WHERE identity_hash = ?", COLUMNS);
        let tx = conn
            .query_row(&sql, params![identity_hash], |row| Self::row_to_transaction(row))
            .optional()?;
        Ok(tx)
    }

    /// Insert a transaction, overwriting any record with the same hash
    ///
    /// A missing `uploaded_at` keeps the stored timestamp (or the insert time).
    pub fn upsert_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO transactions (identity_hash, date, amount, description, category,
                sub_category, spender, source_file, uploaded_from, ref_id, bank_category,
                transaction_type, not_duplicate_of, duplicate_of, is_duplicate, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                COALESCE(?16, CURRENT_TIMESTAMP))
            ON CONFLICT(identity_hash) DO UPDATE SET
                date = excluded.date,
                amount = excluded.amount,
                description = excluded.description,
                category = excluded.category,
                sub_category = excluded.sub_category,
                spender = excluded.spender,
                source_file = excluded.source_file,
                uploaded_from = excluded.uploaded_from,
                ref_id = excluded.ref_id,
                bank_category = excluded.bank_category,
                transaction_type = excluded.transaction_type,
                not_duplicate_of = excluded.not_duplicate_of,
                duplicate_of = excluded.duplicate_of,
                is_duplicate = excluded.is_duplicate,
                uploaded_at = COALESCE(?16, transactions.uploaded_at)
            "#,
            params![
                tx.identity_hash,
                tx.date.format("%Y-%m-%d").to_string(),
                tx.amount,
                tx.description,
                tx.category.as_str(),
                tx.sub_category,
                tx.spender,
                tx.source_file.as_str(),
                tx.uploaded_from,
                tx.ref_id,
                tx.bank_category,
                tx.transaction_type,
                serde_json::to_string(&tx.not_duplicate_of)?,
                tx.duplicate_of,
                tx.is_duplicate as i64,
                tx.uploaded_at.map(|t| t.format(DATETIME_FORMAT).to_string()),
            ],
        )?;
        Ok(())
    }

    /// Apply a partial update; `false` if the hash is unknown
    pub fn update_transaction(&self, identity_hash: &str, patch: &TransactionPatch) -> Result<bool> {
        let conn = self.conn()?;
        apply_patch(&conn, identity_hash, patch)
    }

    /// Apply many partial updates, `batch_size` per SQL transaction
    ///
    /// A failing chunk rolls back on its own; chunks already committed stay.
    pub fn update_transactions(&self, updates: &[(String, TransactionPatch)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let mut changed = 0;

        for chunk in updates.chunks(self.batch_size) {
            let sql_tx = conn.transaction()?;
            for (identity_hash, patch) in chunk {
                if apply_patch(&sql_tx, identity_hash, patch)? {
                    changed += 1;
                }
            }
            sql_tx.commit()?;
            debug!("Committed batch of {} updates", chunk.len());
        }

        Ok(changed)
    }

    /// Transactions dated within `[from, to]`
    pub fn transactions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Transaction>> {
        self.select(
            "WHERE date BETWEEN ? AND ?",
            &[&date_bound(from), &date_bound(to)],
        )
    }

    pub fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.select("", &[])
    }

    pub fn count_transactions(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn delete_transaction(&self, identity_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM transactions WHERE identity_hash = ?",
            params![identity_hash],
        )?;
        Ok(deleted > 0)
    }

    /// Remove every transaction; returns how many were deleted
    pub fn delete_all_transactions(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM transactions", [])?;
        Ok(deleted)
    }
}

/// Range bound as stored text; dates outside four-digit years would not sort
fn date_bound(date: NaiveDate) -> String {
    let first = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN);
    let last = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);
    date.clamp(first, last).format("%Y-%m-%d").to_string()
}

/// Parse a SQLite datetime string ("YYYY-MM-DD HH:MM:SS")
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

impl TransactionStore for Database {
    fn get_by_id(&self, identity_hash: &str) -> Result<Option<Transaction>> {
        self.get_transaction(identity_hash)
    }

    fn put(&self, tx: &Transaction) -> Result<()> {
        self.upsert_transaction(tx)
    }

    fn update_fields(&self, identity_hash: &str, patch: &TransactionPatch) -> Result<bool> {
        self.update_transaction(identity_hash, patch)
    }

    fn batch_update(&self, updates: &[(String, TransactionPatch)]) -> Result<usize> {
        self.update_transactions(updates)
    }

    fn query_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Transaction>> {
        self.transactions_between(from, to)
    }

    fn query_all(&self) -> Result<Vec<Transaction>> {
        self.all_transactions()
    }

    fn delete(&self, identity_hash: &str) -> Result<bool> {
        self.delete_transaction(identity_hash)
    }

    fn delete_all(&self) -> Result<usize> {
        self.delete_all_transactions()
    }
}
