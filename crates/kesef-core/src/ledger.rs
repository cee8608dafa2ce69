//! Import, reconciliation and editing of stored transactions
//!
//! The [`Ledger`] is what outer layers (UI, AI categorization) call. It never
//! returns storage errors: failures are logged and reported as "nothing
//! happened" (`None`, `false` or `0`), so one bad write never aborts a whole
//! upload.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, DedupConfig};
use crate::dedup::{check_near_duplicates, find_potential_duplicates};
use crate::error::Result;
use crate::models::{
    Category, DuplicateGroup, ImportOutcome, NearDuplicate, Transaction, TransactionPatch,
};
use crate::store::TransactionStore;

/// Counts from importing a batch of parsed transactions
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Suspected duplicates of newly added records, for review
    pub near_duplicates: Vec<(String, NearDuplicate)>,
}

/// Null fields of `stored` that `incoming` can fill
///
/// Only enrichment fields are considered and a stored value is never
/// overwritten.
fn enrichment(stored: &Transaction, incoming: &Transaction) -> TransactionPatch {
    fn fill(stored: &Option<String>, incoming: &Option<String>) -> Option<String> {
        match (stored, incoming) {
            (None, Some(v)) if !v.is_empty() => Some(v.clone()),
            _ => None,
        }
    }

    TransactionPatch {
        bank_category: fill(&stored.bank_category, &incoming.bank_category),
        transaction_type: fill(&stored.transaction_type, &incoming.transaction_type),
        spender: fill(&stored.spender, &incoming.spender),
        uploaded_from: fill(&stored.uploaded_from, &incoming.uploaded_from),
        ..Default::default()
    }
}

/// Dates within `days` of `date`, saturating at the calendar limits
fn search_window(date: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    let Some(window) = Duration::try_days(days.max(0)) else {
        return (NaiveDate::MIN, NaiveDate::MAX);
    };
    (
        date.checked_sub_signed(window).unwrap_or(NaiveDate::MIN),
        date.checked_add_signed(window).unwrap_or(NaiveDate::MAX),
    )
}

/// Transaction service over a store
pub struct Ledger<S: TransactionStore> {
    store: S,
    dedup: DedupConfig,
}

impl<S: TransactionStore> Ledger<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            dedup: config.dedup.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn try_import(&self, tx: &Transaction) -> Result<ImportOutcome> {
        if let Some(stored) = self.store.get_by_id(&tx.identity_hash)? {
            let patch = enrichment(&stored, tx);
            if patch.is_empty() {
                return Ok(ImportOutcome::Skipped);
            }
            self.store.update_fields(&tx.identity_hash, &patch)?;
            debug!("Enriched {} with new fields", tx.identity_hash);
            return Ok(ImportOutcome::Updated);
        }

        let mut new_tx = tx.clone();
        new_tx.uploaded_at.get_or_insert_with(Utc::now);
        self.store.put(&new_tx)?;
        Ok(ImportOutcome::Added)
    }

    /// Insert a transaction, or enrich the stored copy with the same hash
    ///
    /// `None` if the store failed.
    pub fn import_transaction(&self, tx: &Transaction) -> Option<ImportOutcome> {
        match self.try_import(tx) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Failed to import {}: {}", tx.identity_hash, e);
                None
            }
        }
    }

    /// Import a parsed batch
    ///
    /// Records without an exact hash match are also checked for near
    /// duplicates against what was stored before them.
    pub fn import_batch(&self, transactions: &[Transaction]) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for tx in transactions {
            let is_new = matches!(self.store.get_by_id(&tx.identity_hash), Ok(None));
            if is_new {
                for found in self.near_duplicates(tx) {
                    summary
                        .near_duplicates
                        .push((tx.identity_hash.clone(), found));
                }
            }

            match self.import_transaction(tx) {
                Some(ImportOutcome::Added) => summary.added += 1,
                Some(ImportOutcome::Updated) => summary.updated += 1,
                Some(ImportOutcome::Skipped) => summary.skipped += 1,
                None => summary.failed += 1,
            }
        }

        info!(
            "Imported {} transactions: {} added, {} updated, {} skipped, {} failed, {} near duplicates",
            transactions.len(),
            summary.added,
            summary.updated,
            summary.skipped,
            summary.failed,
            summary.near_duplicates.len()
        );
        summary
    }

    /// Stored records within the configured window that look like `tx`
    pub fn near_duplicates(&self, tx: &Transaction) -> Vec<NearDuplicate> {
        let (from, to) = search_window(tx.date, self.dedup.window_days);
        match self.store.query_range(from, to) {
            Ok(nearby) => {
                check_near_duplicates(tx, &nearby, self.dedup.near_duplicate_threshold)
            }
            Err(e) => {
                warn!("Near-duplicate lookup failed for {}: {}", tx.identity_hash, e);
                Vec::new()
            }
        }
    }

    /// Scan everything stored for duplicate groups
    pub fn potential_duplicates(&self) -> Vec<DuplicateGroup> {
        match self.store.query_all() {
            Ok(all) => find_potential_duplicates(&all, self.dedup.scan_threshold),
            Err(e) => {
                warn!("Duplicate scan failed: {}", e);
                Vec::new()
            }
        }
    }

    fn load_all(&self, hashes: &[String]) -> Result<Option<Vec<Transaction>>> {
        let mut found = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.store.get_by_id(hash)? {
                Some(tx) => found.push(tx),
                None => return Ok(None),
            }
        }
        Ok(Some(found))
    }

    fn try_mark_not_duplicate(&self, hashes: &[String]) -> Result<bool> {
        let Some(records) = self.load_all(hashes)? else {
            return Ok(false);
        };

        let updates: Vec<(String, TransactionPatch)> = records
            .into_iter()
            .map(|tx| {
                let mut marks = tx.not_duplicate_of.clone();
                marks.extend(
                    hashes
                        .iter()
                        .filter(|h| **h != tx.identity_hash)
                        .cloned(),
                );
                let patch = TransactionPatch {
                    not_duplicate_of: Some(marks),
                    ..Default::default()
                };
                (tx.identity_hash, patch)
            })
            .collect();

        self.store.batch_update(&updates)?;
        Ok(true)
    }

    /// Record that the given transactions are pairwise distinct
    ///
    /// Every record gets every other hash in its `not_duplicate_of` set. Needs
    /// at least two known hashes; `false` otherwise.
    pub fn mark_not_duplicate(&self, hashes: &[String]) -> bool {
        if hashes.len() < 2 {
            return false;
        }
        match self.try_mark_not_duplicate(hashes) {
            Ok(marked) => marked,
            Err(e) => {
                warn!("Failed to mark {:?} as distinct: {}", hashes, e);
                false
            }
        }
    }

    fn try_clear_not_duplicate(&self, a: &str, b: &str) -> Result<bool> {
        let pair = [a.to_string(), b.to_string()];
        let Some(records) = self.load_all(&pair)? else {
            return Ok(false);
        };

        let updates: Vec<(String, TransactionPatch)> = records
            .into_iter()
            .zip([b, a])
            .map(|(tx, other)| {
                let mut marks = tx.not_duplicate_of;
                marks.remove(other);
                let patch = TransactionPatch {
                    not_duplicate_of: Some(marks),
                    ..Default::default()
                };
                (tx.identity_hash, patch)
            })
            .collect();

        self.store.batch_update(&updates)?;
        Ok(true)
    }

    /// Undo a "not a duplicate" decision for a pair
    pub fn clear_not_duplicate(&self, a: &str, b: &str) -> bool {
        match self.try_clear_not_duplicate(a, b) {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!("Failed to clear distinct mark {} / {}: {}", a, b, e);
                false
            }
        }
    }

    /// Flag `identity_hash` as a duplicate of `original`
    pub fn mark_as_duplicate(&self, identity_hash: &str, original: &str) -> bool {
        if identity_hash == original {
            return false;
        }
        match self.store.get_by_id(original) {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                warn!("Failed to look up {}: {}", original, e);
                return false;
            }
        }

        let patch = TransactionPatch {
            duplicate_of: Some(original.to_string()),
            is_duplicate: Some(true),
            ..Default::default()
        };
        self.update_transaction(identity_hash, &patch)
    }

    /// Apply a manual or AI edit to one transaction
    pub fn update_transaction(&self, identity_hash: &str, patch: &TransactionPatch) -> bool {
        match self.store.update_fields(identity_hash, patch) {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Failed to update {}: {}", identity_hash, e);
                false
            }
        }
    }

    /// Apply many edits; returns how many records changed
    pub fn update_batch(&self, updates: &[(String, TransactionPatch)]) -> usize {
        match self.store.batch_update(updates) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Batch update of {} records failed: {}", updates.len(), e);
                0
            }
        }
    }

    pub fn delete_transaction(&self, identity_hash: &str) -> bool {
        match self.store.delete(identity_hash) {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete {}: {}", identity_hash, e);
                false
            }
        }
    }

    /// Delete several transactions; returns how many existed
    pub fn delete_transactions(&self, hashes: &[String]) -> usize {
        hashes
            .iter()
            .filter(|h| self.delete_transaction(h))
            .count()
    }

    /// Full reset
    pub fn delete_all(&self) -> usize {
        match self.store.delete_all() {
            Ok(deleted) => {
                info!("Deleted all {} transactions", deleted);
                deleted
            }
            Err(e) => {
                warn!("Failed to delete all transactions: {}", e);
                0
            }
        }
    }

    /// Transactions of one calendar month
    pub fn transactions_by_month(&self, year: i32, month: u32) -> Vec<Transaction> {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Vec::new();
        };
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let Some(last) = next.and_then(|d| d.pred_opt()) else {
            return Vec::new();
        };

        match self.store.query_range(first, last) {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to load {}-{:02}: {}", first.year(), month, e);
                Vec::new()
            }
        }
    }

    /// Uncategorized transactions, newest first, for AI or manual review
    pub fn uncategorized(&self, limit: usize) -> Vec<Transaction> {
        let mut found: Vec<Transaction> = match self.store.query_all() {
            Ok(all) => all
                .into_iter()
                .filter(|t| t.category == Category::Uncategorized)
                .collect(),
            Err(e) => {
                warn!("Failed to load uncategorized transactions: {}", e);
                return Vec::new();
            }
        };
        found.sort_by(|a, b| b.date.cmp(&a.date));
        found.truncate(limit);
        found
    }

    pub fn uncategorized_count(&self) -> usize {
        match self.store.query_all() {
            Ok(all) => all
                .iter()
                .filter(|t| t.category == Category::Uncategorized)
                .count(),
            Err(e) => {
                warn!("Failed to count uncategorized transactions: {}", e);
                0
            }
        }
    }
}
