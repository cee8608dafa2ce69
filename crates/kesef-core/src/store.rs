//! Persistence seam for transactions
//!
//! The ledger talks to storage only through [`TransactionStore`]. The SQLite
//! [`Database`](crate::db::Database) is the production implementation.

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Transaction, TransactionPatch};

/// Document-style store keyed by identity hash
pub trait TransactionStore {
    fn get_by_id(&self, identity_hash: &str) -> Result<Option<Transaction>>;

    /// Insert or overwrite the record with the same identity hash
    fn put(&self, tx: &Transaction) -> Result<()>;

    /// Apply a patch; `false` if no record has that hash
    fn update_fields(&self, identity_hash: &str, patch: &TransactionPatch) -> Result<bool>;

    /// Apply many patches atomically; returns how many records changed
    fn batch_update(&self, updates: &[(String, TransactionPatch)]) -> Result<usize>;

    /// Records dated within `[from, to]`, inclusive
    fn query_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Transaction>>;

    fn query_all(&self) -> Result<Vec<Transaction>>;

    /// `false` if no record has that hash
    fn delete(&self, identity_hash: &str) -> Result<bool>;

    fn delete_all(&self) -> Result<usize>;
}
