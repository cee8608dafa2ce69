//! Transaction identity hashing
//!
//! The identity hash is the primary key of a stored transaction. It is a pure
//! function of the date, the signed amount, the normalized description and the
//! optional source reference number, so re-uploading the same file always
//! lands on the same records.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::normalize::normalize_description;

/// Compute the identity hash of a transaction
///
/// `SHA-256("{YYYY-MM-DD}_{amount:.2}_{normalized description}[_{ref_id}]")`,
/// hex encoded. An empty `ref_id` is treated as absent.
pub fn compute_identity_hash(
    date: NaiveDate,
    amount: f64,
    description: &str,
    ref_id: Option<&str>,
) -> String {
    let mut raw = format!(
        "{}_{:.2}_{}",
        date.format("%Y-%m-%d"),
        amount,
        normalize_description(description)
    );
    if let Some(reference) = ref_id.filter(|r| !r.is_empty()) {
        raw.push('_');
        raw.push_str(reference);
    }

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
