//! Data models for Kesef

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Transaction categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Food,
    Groceries,
    Transport,
    Shopping,
    Bills,
    Salary,
    Income,
    Benefits,
    Interest,
    Health,
    Entertainment,
    Transfer,
    #[serde(rename = "Rent/Mortgage")]
    RentMortgage,
    Savings,
    #[serde(rename = "Credit Card Payoff")]
    CreditCardPayoff,
    Refund,
    #[default]
    Uncategorized,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "Food",
            Self::Groceries => "Groceries",
            Self::Transport => "Transport",
            Self::Shopping => "Shopping",
            Self::Bills => "Bills",
            Self::Salary => "Salary",
            Self::Income => "Income",
            Self::Benefits => "Benefits",
            Self::Interest => "Interest",
            Self::Health => "Health",
            Self::Entertainment => "Entertainment",
            Self::Transfer => "Transfer",
            Self::RentMortgage => "Rent/Mortgage",
            Self::Savings => "Savings",
            Self::CreditCardPayoff => "Credit Card Payoff",
            Self::Refund => "Refund",
            Self::Uncategorized => "Uncategorized",
            Self::Other => "Other",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Self::Food,
            Self::Groceries,
            Self::Transport,
            Self::Shopping,
            Self::Bills,
            Self::Salary,
            Self::Income,
            Self::Benefits,
            Self::Interest,
            Self::Health,
            Self::Entertainment,
            Self::Transfer,
            Self::RentMortgage,
            Self::Savings,
            Self::CreditCardPayoff,
            Self::Refund,
            Self::Uncategorized,
            Self::Other,
        ]
    }

    /// Categories counted as income in summaries
    pub fn is_income(&self) -> bool {
        matches!(
            self,
            Self::Salary | Self::Income | Self::Benefits | Self::Interest
        )
    }

    pub fn is_savings(&self) -> bool {
        matches!(self, Self::Savings)
    }

    /// Categories left out of expense totals (the itemized card charges already count)
    pub fn is_ignored_for_expenses(&self) -> bool {
        matches!(self, Self::CreditCardPayoff)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str().to_lowercase() == wanted)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broad origin of a statement: the bank account itself or a credit card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceClass {
    Bank,
    Card,
}

/// Statement layouts Kesef knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// One Zero PDF with a recognizable column header
    #[serde(rename = "onezero_pdf_table")]
    BankPdfTable,
    /// One Zero PDF without a usable header, read line by line
    #[serde(rename = "onezero_pdf_text")]
    BankPdfText,
    /// One Zero Excel export (pre-signed amounts)
    #[serde(rename = "onezero_excel")]
    BankExcel,
    /// Isracard CSV/XLSX export
    #[serde(rename = "isracard_csv")]
    CardIsracard,
    /// Max CSV/XLSX export
    #[serde(rename = "max_csv")]
    CardMax,
    /// Isracard digital PDF statement
    #[serde(rename = "isracard_pdf")]
    CardPdf,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankPdfTable => "onezero_pdf_table",
            Self::BankPdfText => "onezero_pdf_text",
            Self::BankExcel => "onezero_excel",
            Self::CardIsracard => "isracard_csv",
            Self::CardMax => "max_csv",
            Self::CardPdf => "isracard_pdf",
        }
    }

    pub fn class(&self) -> SourceClass {
        match self {
            Self::BankPdfTable | Self::BankPdfText | Self::BankExcel => SourceClass::Bank,
            Self::CardIsracard | Self::CardMax | Self::CardPdf => SourceClass::Card,
        }
    }

    pub fn is_bank(&self) -> bool {
        self.class() == SourceClass::Bank
    }

    pub fn is_card(&self) -> bool {
        self.class() == SourceClass::Card
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onezero_pdf_table" => Ok(Self::BankPdfTable),
            "onezero_pdf_text" => Ok(Self::BankPdfText),
            "onezero_excel" => Ok(Self::BankExcel),
            "isracard_csv" | "isracard" => Ok(Self::CardIsracard),
            "max_csv" | "max" => Ok(Self::CardMax),
            "isracard_pdf" => Ok(Self::CardPdf),
            _ => Err(format!("Unknown source format: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A canonical transaction, keyed by its identity hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub identity_hash: String,
    pub date: NaiveDate,
    /// Negative = expense, positive = income or refund
    pub amount: f64,
    pub description: String,
    pub category: Category,
    pub sub_category: Option<String>,
    pub spender: Option<String>,
    /// Adapter that produced the record
    pub source_file: SourceFormat,
    /// Literal name of the uploaded file
    pub uploaded_from: Option<String>,
    pub ref_id: Option<String>,
    /// Bank's own classification (סוג פעולה)
    pub bank_category: Option<String>,
    /// Debit/credit flag as reported by the source (חיוב/זיכוי)
    pub transaction_type: Option<String>,
    /// Hashes a reviewer confirmed are not duplicates of this one
    #[serde(default)]
    pub not_duplicate_of: BTreeSet<String>,
    pub duplicate_of: Option<String>,
    #[serde(default)]
    pub is_duplicate: bool,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Partial update applied to a stored transaction
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub description: Option<String>,
    pub category: Option<Category>,
    pub sub_category: Option<String>,
    pub spender: Option<String>,
    pub uploaded_from: Option<String>,
    pub bank_category: Option<String>,
    pub transaction_type: Option<String>,
    pub not_duplicate_of: Option<BTreeSet<String>>,
    pub duplicate_of: Option<String>,
    pub is_duplicate: Option<bool>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply this patch to an in-memory transaction
    pub fn apply_to(&self, tx: &mut Transaction) {
        if let Some(ref v) = self.description {
            tx.description = v.clone();
        }
        if let Some(v) = self.category {
            tx.category = v;
        }
        if let Some(ref v) = self.sub_category {
            tx.sub_category = Some(v.clone());
        }
        if let Some(ref v) = self.spender {
            tx.spender = Some(v.clone());
        }
        if let Some(ref v) = self.uploaded_from {
            tx.uploaded_from = Some(v.clone());
        }
        if let Some(ref v) = self.bank_category {
            tx.bank_category = Some(v.clone());
        }
        if let Some(ref v) = self.transaction_type {
            tx.transaction_type = Some(v.clone());
        }
        if let Some(ref v) = self.not_duplicate_of {
            tx.not_duplicate_of = v.clone();
        }
        if let Some(ref v) = self.duplicate_of {
            tx.duplicate_of = Some(v.clone());
        }
        if let Some(v) = self.is_duplicate {
            tx.is_duplicate = v;
        }
    }
}

/// Result of importing a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    /// New identity hash, inserted
    Added,
    /// Existing record had null fields filled in
    Updated,
    /// Existing record already had everything
    Skipped,
}

impl ImportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
        }
    }
}

/// A stored transaction suspected to duplicate a candidate
#[derive(Debug, Clone, Serialize)]
pub struct NearDuplicate {
    pub existing: Transaction,
    pub confidence: f64,
    pub reason: String,
}

/// A connected cluster of suspected duplicates
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub transactions: Vec<Transaction>,
    /// Confidence of the strongest pair in the group
    pub confidence: f64,
    pub reason: String,
}

/// How a caller should treat a duplicate confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    High,
    NeedsReview,
    NotFlagged,
}

impl ConfidenceBucket {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.85 {
            Self::High
        } else if confidence >= 0.75 {
            Self::NeedsReview
        } else {
            Self::NotFlagged
        }
    }
}

/// Why a document produced no transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ParseIssue {
    /// The bytes could not be read as PDF, CSV or spreadsheet
    Unreadable(String),
    /// No known statement signature matched
    Unrecognized,
    /// A known layout was detected but its required columns were not found
    MissingColumns(String),
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable(msg) => write!(f, "unreadable file: {}", msg),
            Self::Unrecognized => write!(f, "unrecognized statement format"),
            Self::MissingColumns(msg) => write!(f, "missing columns: {}", msg),
        }
    }
}

/// Outcome of parsing one uploaded file
#[derive(Debug, Clone, Serialize)]
pub struct ParseReport {
    pub format: Option<SourceFormat>,
    pub transactions: Vec<Transaction>,
    pub issue: Option<ParseIssue>,
}

impl ParseReport {
    pub(crate) fn failed(format: Option<SourceFormat>, issue: ParseIssue) -> Self {
        Self {
            format,
            transactions: Vec::new(),
            issue: Some(issue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        assert_eq!(Category::CreditCardPayoff.as_str(), "Credit Card Payoff");
        assert_eq!(
            "rent/mortgage".parse::<Category>().unwrap(),
            Category::RentMortgage
        );
        assert!("Restaurants".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_uses_display_names() {
        let json = serde_json::to_string(&Category::CreditCardPayoff).unwrap();
        assert_eq!(json, "\"Credit Card Payoff\"");
        let back: Category = serde_json::from_str("\"Rent/Mortgage\"").unwrap();
        assert_eq!(back, Category::RentMortgage);
    }

    #[test]
    fn test_source_format_class() {
        assert!(SourceFormat::BankExcel.is_bank());
        assert!(SourceFormat::CardPdf.is_card());
        assert_eq!(
            "max_csv".parse::<SourceFormat>().unwrap(),
            SourceFormat::CardMax
        );
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(ConfidenceBucket::from_confidence(0.90), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_confidence(0.85), ConfidenceBucket::High);
        assert_eq!(
            ConfidenceBucket::from_confidence(0.80),
            ConfidenceBucket::NeedsReview
        );
        assert_eq!(
            ConfidenceBucket::from_confidence(0.74),
            ConfidenceBucket::NotFlagged
        );
    }
}
