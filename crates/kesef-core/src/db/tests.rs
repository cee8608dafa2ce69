//! Database tests

use super::*;
use crate::models::*;
use crate::store::TransactionStore;
use chrono::NaiveDate;
use std::collections::BTreeSet;

fn sample(hash: &str, day: u32, amount: f64, description: &str) -> Transaction {
    Transaction {
        identity_hash: hash.to_string(),
        date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
        amount,
        description: description.to_string(),
        category: Category::Uncategorized,
        sub_category: None,
        spender: Some("Joint".to_string()),
        source_file: SourceFormat::CardIsracard,
        uploaded_from: Some("isracard.csv".to_string()),
        ref_id: None,
        bank_category: None,
        transaction_type: None,
        not_duplicate_of: BTreeSet::new(),
        duplicate_of: None,
        is_duplicate: false,
        uploaded_at: None,
    }
}

#[test]
fn test_in_memory_db() {
    let db = Database::in_memory().unwrap();
    assert!(db.all_transactions().unwrap().is_empty());
    assert_eq!(db.batch_size(), DEFAULT_BATCH_SIZE);
}

#[test]
fn test_open_uses_configured_batch_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kesef.db");
    let config = crate::config::Config::from_toml("[import]\nbatch_size = 25\n").unwrap();

    let db = Database::open(path.to_str().unwrap(), None, &config).unwrap();
    assert_eq!(db.batch_size(), 25);
    assert_eq!(db.path(), path.to_str().unwrap());
}

#[test]
fn test_encrypted_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secret.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::new_with_key(path, Some("correct horse")).unwrap();
        assert!(db.is_encrypted().unwrap());
        db.put(&sample("h1", 4, -245.9, "שופרסל")).unwrap();
    }

    let reopened = Database::new_with_key(path, Some("correct horse")).unwrap();
    let stored = reopened.get_by_id("h1").unwrap().unwrap();
    assert_eq!(stored.description, "שופרסל");

    assert!(Database::new_with_key(path, Some("wrong passphrase")).is_err());
    assert!(!Database::in_memory().unwrap().is_encrypted().unwrap());
}

#[test]
fn test_new_requires_key_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.db");
    let path = path.to_str().unwrap();

    std::env::remove_var(DB_KEY_ENV);
    assert!(matches!(Database::new(path), Err(Error::Encryption(_))));

    std::env::set_var(DB_KEY_ENV, "from the environment");
    let db = Database::new(path);
    std::env::remove_var(DB_KEY_ENV);
    assert!(db.unwrap().is_encrypted().unwrap());
}

#[test]
fn test_put_and_get_round_trip() {
    let db = Database::in_memory().unwrap();
    let mut tx = sample("h1", 4, -245.9, "שופרסל");
    tx.category = Category::CreditCardPayoff;
    tx.not_duplicate_of.insert("h9".to_string());
    tx.ref_id = Some("123456789".to_string());
    db.put(&tx).unwrap();

    let stored = db.get_by_id("h1").unwrap().unwrap();
    assert_eq!(stored.description, "שופרסל");
    assert_eq!(stored.category, Category::CreditCardPayoff);
    assert_eq!(stored.source_file, SourceFormat::CardIsracard);
    assert!(stored.not_duplicate_of.contains("h9"));
    // Filled in by the database on insert
    assert!(stored.uploaded_at.is_some());

    assert!(db.get_by_id("missing").unwrap().is_none());
}

#[test]
fn test_put_overwrites_same_hash() {
    let db = Database::in_memory().unwrap();
    db.put(&sample("h1", 4, -10.0, "a")).unwrap();
    db.put(&sample("h1", 4, -10.0, "b")).unwrap();

    assert_eq!(db.count_transactions().unwrap(), 1);
    assert_eq!(db.get_by_id("h1").unwrap().unwrap().description, "b");
}

#[test]
fn test_update_fields() {
    let db = Database::in_memory().unwrap();
    db.put(&sample("h1", 4, -10.0, "a")).unwrap();

    let patch = TransactionPatch {
        category: Some(Category::Food),
        spender: Some("Dana".to_string()),
        is_duplicate: Some(true),
        ..Default::default()
    };
    assert!(db.update_fields("h1", &patch).unwrap());
    assert!(!db.update_fields("nope", &patch).unwrap());

    let stored = db.get_by_id("h1").unwrap().unwrap();
    assert_eq!(stored.category, Category::Food);
    assert_eq!(stored.spender.as_deref(), Some("Dana"));
    assert!(stored.is_duplicate);
    assert_eq!(stored.description, "a");

    // Empty patch only reports existence
    assert!(db.update_fields("h1", &TransactionPatch::default()).unwrap());
}

#[test]
fn test_batch_update_spans_chunks() {
    let db = Database::in_memory().unwrap().with_batch_size(2);
    for (i, hash) in ["h1", "h2", "h3", "h4", "h5"].iter().enumerate() {
        db.put(&sample(hash, i as u32 + 1, -10.0, "x")).unwrap();
    }

    let patch = TransactionPatch {
        category: Some(Category::Transport),
        ..Default::default()
    };
    let updates: Vec<(String, TransactionPatch)> = ["h1", "h2", "h3", "h5", "ghost"]
        .iter()
        .map(|h| (h.to_string(), patch.clone()))
        .collect();

    assert_eq!(db.batch_update(&updates).unwrap(), 4);
    let transport = db
        .query_all()
        .unwrap()
        .into_iter()
        .filter(|t| t.category == Category::Transport)
        .count();
    assert_eq!(transport, 4);
}

#[test]
fn test_query_range_is_inclusive() {
    let db = Database::in_memory().unwrap();
    for day in [1, 5, 9, 10, 20] {
        db.put(&sample(&format!("h{}", day), day, -1.0, "x")).unwrap();
    }

    let from = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
    let to = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
    let found = db.query_range(from, to).unwrap();
    let days: Vec<u32> = found.iter().map(|t| chrono::Datelike::day(&t.date)).collect();
    assert_eq!(days, vec![5, 9, 10]);
}

#[test]
fn test_query_range_at_calendar_limits() {
    let db = Database::in_memory().unwrap();
    db.put(&sample("h1", 7, -1.0, "x")).unwrap();

    let found = db.query_range(NaiveDate::MIN, NaiveDate::MAX).unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_delete() {
    let db = Database::in_memory().unwrap();
    db.put(&sample("h1", 1, -1.0, "x")).unwrap();
    db.put(&sample("h2", 2, -1.0, "y")).unwrap();

    assert!(db.delete("h1").unwrap());
    assert!(!db.delete("h1").unwrap());
    assert_eq!(db.delete_all().unwrap(), 1);
    assert!(db.query_all().unwrap().is_empty());
}

#[test]
fn test_unknown_category_reads_as_uncategorized() {
    let db = Database::in_memory().unwrap();
    db.put(&sample("h1", 1, -1.0, "x")).unwrap();
    db.conn()
        .unwrap()
        .execute(
            "UPDATE transactions SET category = 'Restaurants' WHERE identity_hash = 'h1'",
            [],
        )
        .unwrap();

    let stored = db.get_by_id("h1").unwrap().unwrap();
    assert_eq!(stored.category, Category::Uncategorized);
}
