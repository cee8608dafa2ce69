//! Turns adapter rows into canonical transactions
//!
//! Each source format has a fixed [`AssemblyPolicy`]: how its amounts are
//! signed, how its Hebrew text is ordered, which category rules apply and
//! whether descriptions get scrubbed. Category inference runs on the text
//! before scrubbing so reference numbers and currency tokens the rules key on
//! are still present.

use tracing::debug;

use crate::categorize::{Categorizer, RuleSet};
use crate::identity::compute_identity_hash;
use crate::import::{RawAmount, RawRow};
use crate::models::{SourceFormat, Transaction};
use crate::normalize::{scrub_description, RtlRepair};
use crate::profile::SpenderResolver;

/// Display text for bank rows whose description scrubs down to nothing
pub const BANK_FALLBACK_DESCRIPTION: &str = "OneZero Transaction";

const REFUND_NOTES: &[&str] = &["ביטול", "זיכוי", "החזר"];
const REFUND_DESCRIPTIONS: &[&str] = &["זיכוי", "החזר"];

/// How a source reports the sign of an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignPolicy {
    /// Already negative for expenses (bank exports)
    AsReported,
    /// Charges positive, refunds negative (Isracard); flipped
    ChargesPositive,
    /// Unsigned; refunds are recognized by keyword (Max)
    RefundByKeyword,
}

impl SignPolicy {
    pub fn apply(&self, amount: &RawAmount, description: &str, notes: Option<&str>) -> f64 {
        let value = match *amount {
            RawAmount::Signed(v) => v,
            // Debit is money out, credit money in; never both
            RawAmount::DebitCredit { debit, .. } if debit != 0.0 => return -debit.abs(),
            RawAmount::DebitCredit { credit, .. } => return credit.abs(),
        };

        match self {
            Self::AsReported => value,
            Self::ChargesPositive if value < 0.0 => value.abs(),
            Self::ChargesPositive => -value.abs(),
            Self::RefundByKeyword => {
                let notes = notes.unwrap_or_default();
                let is_refund = REFUND_NOTES.iter().any(|k| notes.contains(k))
                    || REFUND_DESCRIPTIONS.iter().any(|k| description.contains(k));
                if is_refund {
                    value.abs()
                } else {
                    -value.abs()
                }
            }
        }
    }
}

/// Per-format assembly rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyPolicy {
    pub sign: SignPolicy,
    pub rtl: RtlRepair,
    pub rules: RuleSet,
    /// Strip currency tokens and reference numbers from bank descriptions
    pub scrub: bool,
}

impl AssemblyPolicy {
    pub fn for_format(format: SourceFormat) -> Self {
        let bank = |rtl| Self {
            sign: SignPolicy::AsReported,
            rtl,
            rules: RuleSet::Bank,
            scrub: true,
        };
        let card = |sign, rtl| Self {
            sign,
            rtl,
            rules: RuleSet::Card,
            scrub: false,
        };

        match format {
            SourceFormat::BankPdfTable | SourceFormat::BankPdfText => bank(RtlRepair::Off),
            // The Excel export sometimes stores Hebrew in visual order
            SourceFormat::BankExcel => bank(RtlRepair::SearchBothOrders),
            SourceFormat::CardIsracard => card(SignPolicy::ChargesPositive, RtlRepair::Off),
            SourceFormat::CardMax => card(SignPolicy::RefundByKeyword, RtlRepair::Off),
            // Isracard PDFs extract Hebrew in visual order
            SourceFormat::CardPdf => card(SignPolicy::ChargesPositive, RtlRepair::ReverseHebrew),
        }
    }
}

/// Builds transactions for one parsed file
pub struct Assembler<'a> {
    format: SourceFormat,
    policy: AssemblyPolicy,
    categorizer: &'a Categorizer,
    spenders: SpenderResolver<'a>,
    filename: String,
}

impl<'a> Assembler<'a> {
    pub fn new(
        format: SourceFormat,
        categorizer: &'a Categorizer,
        spenders: SpenderResolver<'a>,
        filename: &str,
    ) -> Self {
        Self {
            format,
            policy: AssemblyPolicy::for_format(format),
            categorizer,
            spenders,
            filename: filename.to_string(),
        }
    }

    /// Build a transaction, or `None` for rows without a date or amount
    pub fn assemble(&self, row: RawRow) -> Option<Transaction> {
        let Some(date) = row.date.as_date() else {
            debug!("Skipping row without a parseable date: {}", row.description);
            return None;
        };

        let amount = self
            .policy
            .sign
            .apply(&row.amount, &row.description, row.notes.as_deref());
        if amount == 0.0 {
            debug!("Skipping zero-amount row: {}", row.description);
            return None;
        }

        let display = self.policy.rtl.display(&row.description);
        let search_text = self.policy.rtl.search_text(&row.description);
        let category = self
            .categorizer
            .categorize(self.policy.rules, &search_text, amount);

        let spender = self.spenders.resolve(&[
            display.as_str(),
            row.description.as_str(),
            row.card_hint.as_deref().unwrap_or_default(),
        ]);

        let description = if self.policy.scrub {
            let scrubbed = scrub_description(&display);
            if scrubbed.chars().count() < 2 {
                BANK_FALLBACK_DESCRIPTION.to_string()
            } else {
                scrubbed
            }
        } else {
            display.trim().to_string()
        };
        if description.is_empty() {
            return None;
        }

        let identity_hash =
            compute_identity_hash(date, amount, &description, row.ref_id.as_deref());

        Some(Transaction {
            identity_hash,
            date,
            amount,
            description,
            category,
            sub_category: None,
            spender: Some(spender),
            source_file: self.format,
            uploaded_from: Some(self.filename.clone()),
            ref_id: row.ref_id,
            bank_category: row.bank_category,
            transaction_type: row.transaction_type,
            not_duplicate_of: Default::default(),
            duplicate_of: None,
            is_duplicate: false,
            uploaded_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Cell;
    use crate::models::Category;
    use crate::profile::UserProfile;
    use chrono::NaiveDate;

    fn household() -> UserProfile {
        UserProfile::default()
            .with_card("4610", "Dana")
            .with_card("0164", "Dmitry")
    }

    fn row(date: &str, description: &str, amount: RawAmount) -> RawRow {
        RawRow::new(Cell::text(date), description, amount)
    }

    #[test]
    fn test_sign_policies() {
        let debit = RawAmount::DebitCredit {
            debit: 500.0,
            credit: 0.0,
        };
        let credit = RawAmount::DebitCredit {
            debit: 0.0,
            credit: 120.0,
        };
        assert_eq!(SignPolicy::AsReported.apply(&debit, "", None), -500.0);
        assert_eq!(SignPolicy::AsReported.apply(&credit, "", None), 120.0);
        assert_eq!(SignPolicy::AsReported.apply(&RawAmount::Signed(-720.78), "", None), -720.78);

        assert_eq!(SignPolicy::ChargesPositive.apply(&RawAmount::Signed(245.9), "", None), -245.9);
        assert_eq!(SignPolicy::ChargesPositive.apply(&RawAmount::Signed(-30.0), "", None), 30.0);

        let max = SignPolicy::RefundByKeyword;
        assert_eq!(max.apply(&RawAmount::Signed(99.0), "זארה", None), -99.0);
        assert_eq!(max.apply(&RawAmount::Signed(99.0), "זארה", Some("ביטול עסקה")), 99.0);
        assert_eq!(max.apply(&RawAmount::Signed(99.0), "החזר זארה", None), 99.0);
    }

    #[test]
    fn test_isracard_refund_becomes_positive() {
        let profile = household();
        let categorizer = Categorizer::new(&profile);
        let assembler = Assembler::new(
            SourceFormat::CardIsracard,
            &categorizer,
            SpenderResolver::new(&profile, "כרטיס 4610"),
            "isracard.csv",
        );

        let charge = assembler
            .assemble(row("04/01/2025", "שופרסל", RawAmount::Signed(245.90)))
            .unwrap();
        assert_eq!(charge.amount, -245.90);
        assert_eq!(charge.category, Category::Uncategorized);
        assert_eq!(charge.spender.as_deref(), Some("Dana"));
        assert_eq!(charge.uploaded_from.as_deref(), Some("isracard.csv"));
        assert_eq!(charge.source_file, SourceFormat::CardIsracard);

        let refund = assembler
            .assemble(row("05/01/2025", "זיכוי שופרסל", RawAmount::Signed(-30.0)))
            .unwrap();
        assert_eq!(refund.amount, 30.0);
        assert_eq!(refund.category, Category::Refund);
    }

    #[test]
    fn test_bank_description_scrubbed_after_categorizing() {
        let profile = household();
        let categorizer = Categorizer::new(&profile);
        let assembler = Assembler::new(
            SourceFormat::BankPdfTable,
            &categorizer,
            SpenderResolver::new(&profile, ""),
            "onezero.pdf",
        );

        let tx = assembler
            .assemble(row(
                "10/01/2025",
                "ישראכרט 0164 1234567",
                RawAmount::DebitCredit {
                    debit: 1500.0,
                    credit: 0.0,
                },
            ))
            .unwrap();
        assert_eq!(tx.category, Category::CreditCardPayoff);
        assert_eq!(tx.description, "ישראכרט 0164");
        assert_eq!(tx.spender.as_deref(), Some("Dmitry"));
        assert_eq!(tx.amount, -1500.0);
        assert_eq!(
            tx.identity_hash,
            compute_identity_hash(
                NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
                -1500.0,
                "ישראכרט 0164",
                None
            )
        );
    }

    #[test]
    fn test_bank_fallback_description() {
        let profile = UserProfile::default();
        let categorizer = Categorizer::new(&profile);
        let assembler = Assembler::new(
            SourceFormat::BankPdfText,
            &categorizer,
            SpenderResolver::new(&profile, ""),
            "onezero.pdf",
        );
        let tx = assembler
            .assemble(row(
                "10/01/2025",
                "ש\"ח 99999",
                RawAmount::DebitCredit {
                    debit: 0.0,
                    credit: 50.0,
                },
            ))
            .unwrap();
        assert_eq!(tx.description, BANK_FALLBACK_DESCRIPTION);
        assert_eq!(tx.category, Category::Income);
        assert_eq!(tx.spender.as_deref(), Some("Joint"));
    }

    #[test]
    fn test_reversed_excel_text_still_categorized() {
        let profile = UserProfile::default();
        let categorizer = Categorizer::new(&profile);
        let assembler = Assembler::new(
            SourceFormat::BankExcel,
            &categorizer,
            SpenderResolver::new(&profile, ""),
            "onezero.xlsx",
        );
        let tx = assembler
            .assemble(row("01/01/2025", "תרוכשמ", RawAmount::Signed(12000.0)))
            .unwrap();
        assert_eq!(tx.category, Category::Salary);
        assert_eq!(tx.description, "תרוכשמ");
    }

    #[test]
    fn test_card_pdf_reverses_hebrew_only() {
        let profile = UserProfile::default();
        let categorizer = Categorizer::new(&profile);
        let assembler = Assembler::new(
            SourceFormat::CardPdf,
            &categorizer,
            SpenderResolver::new(&profile, ""),
            "isracard.pdf",
        );
        let hebrew = assembler
            .assemble(row("05/01/25", "לסרפוש", RawAmount::Signed(120.0)))
            .unwrap();
        assert_eq!(hebrew.description, "שופרסל");
        assert_eq!(hebrew.amount, -120.0);

        let latin = assembler
            .assemble(row("05/01/25", "AMAZON", RawAmount::Signed(45.0)))
            .unwrap();
        assert_eq!(latin.description, "AMAZON");
    }

    #[test]
    fn test_rows_without_date_or_amount_are_skipped() {
        let profile = UserProfile::default();
        let categorizer = Categorizer::new(&profile);
        let assembler = Assembler::new(
            SourceFormat::CardMax,
            &categorizer,
            SpenderResolver::new(&profile, ""),
            "max.xlsx",
        );
        assert!(assembler
            .assemble(row("not a date", "x", RawAmount::Signed(10.0)))
            .is_none());
        assert!(assembler
            .assemble(row("01/01/2025", "x", RawAmount::Signed(0.0)))
            .is_none());
    }
}
