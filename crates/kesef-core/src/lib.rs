//! Kesef Core Library
//!
//! Household statement ingestion for Israeli banks and credit cards:
//! - Format detection and parsers for One Zero, Isracard and Max exports
//! - Canonical transaction assembly (signs, RTL repair, spender, category)
//! - Content-addressed identity hashing
//! - Exact and fuzzy duplicate detection with reviewer overrides
//! - Encrypted SQLite transaction store
//! - Period summaries

pub mod assemble;
pub mod categorize;
pub mod config;
pub mod db;
pub mod dedup;
pub mod detect;
pub mod document;
pub mod error;
pub mod identity;
pub mod import;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod profile;
pub mod store;

pub use config::{Config, DedupConfig, ImportConfig};
pub use db::Database;
pub use dedup::{check_near_duplicates, duplicate_confidence, find_potential_duplicates};
pub use detect::detect_format;
pub use error::{Error, Result};
pub use identity::compute_identity_hash;
pub use import::{detect_and_parse, StatementParser};
pub use ledger::{ImportSummary, Ledger};
pub use metrics::{summarize, FinancialSummary};
pub use models::*;
pub use profile::{SpenderResolver, UserProfile};
pub use store::TransactionStore;
