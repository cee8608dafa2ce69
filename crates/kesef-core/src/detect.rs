//! Statement format detection
//!
//! Signatures are tried in a fixed order and the first match wins. Header
//! vocabulary overlaps between exports, so the bank export is checked before
//! Max, and Max before Isracard.

use tracing::debug;

use crate::document::Document;
use crate::import::is_pdf_table_header;
use crate::models::SourceFormat;

type Signature = fn(&Document, usize) -> bool;

const SIGNATURES: &[(Signature, SourceFormat)] = &[
    (is_card_pdf, SourceFormat::CardPdf),
    (is_bank_pdf_table, SourceFormat::BankPdfTable),
    (is_bank_pdf_text, SourceFormat::BankPdfText),
    (is_bank_excel, SourceFormat::BankExcel),
    (is_max, SourceFormat::CardMax),
    (is_isracard, SourceFormat::CardIsracard),
];

/// Detect which adapter applies to a loaded document
///
/// Tabular documents are matched against the first `scan_rows` rows of each
/// sheet. Returns `None` for unknown layouts.
pub fn detect_format(document: &Document, scan_rows: usize) -> Option<SourceFormat> {
    let format = SIGNATURES
        .iter()
        .find(|(matches, _)| matches(document, scan_rows))
        .map(|(_, format)| *format);
    debug!("Detected statement format: {:?}", format);
    format
}

fn first_page(document: &Document) -> Option<&str> {
    document.pages().first().map(String::as_str)
}

fn is_card_pdf(document: &Document, _: usize) -> bool {
    first_page(document)
        .map(|text| text.to_lowercase().contains("isracard") || text.contains("ישראכרט"))
        .unwrap_or(false)
}

fn is_bank_pdf_table(document: &Document, _: usize) -> bool {
    first_page(document)
        .map(|text| text.lines().any(is_pdf_table_header))
        .unwrap_or(false)
}

/// Any other PDF is read as a One Zero text statement
fn is_bank_pdf_text(document: &Document, _: usize) -> bool {
    document.is_pdf()
}

fn any_sheet_head(document: &Document, scan_rows: usize, check: impl Fn(&str) -> bool) -> bool {
    document
        .sheets()
        .iter()
        .any(|sheet| check(&sheet.head_text(scan_rows)))
}

fn is_bank_excel(document: &Document, scan_rows: usize) -> bool {
    any_sheet_head(document, scan_rows, |head| {
        head.contains("תאריך תנועה") && head.contains("סכום פעולה")
    })
}

fn is_max(document: &Document, scan_rows: usize) -> bool {
    any_sheet_head(document, scan_rows, |head| {
        head.contains("שם בית העסק") && head.contains("4 ספרות אחרונות")
    })
}

fn is_isracard(document: &Document, scan_rows: usize) -> bool {
    any_sheet_head(document, scan_rows, |head| {
        head.contains("תאריך רכישה") || head.contains("שם בית עסק")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Cell, Sheet};

    fn table(lines: &[&[&str]]) -> Document {
        Document::Table {
            sheets: vec![Sheet::new(
                "csv",
                lines
                    .iter()
                    .map(|l| l.iter().map(|c| Cell::text(c)).collect())
                    .collect(),
            )],
        }
    }

    fn pdf(first_page: &str) -> Document {
        Document::Pdf {
            pages: vec![first_page.to_string(), "second page".to_string()],
        }
    }

    #[test]
    fn test_detect_pdf_variants() {
        assert_eq!(
            detect_format(&pdf("ISRACARD פירוט עסקאות"), 100),
            Some(SourceFormat::CardPdf)
        );
        assert_eq!(
            detect_format(&pdf("דף חשבון\nתאריך  תיאור  חובה  זכות  יתרה"), 100),
            Some(SourceFormat::BankPdfTable)
        );
        assert_eq!(
            detect_format(&pdf("9,500.00 ס 500.00 01/03/2024"), 100),
            Some(SourceFormat::BankPdfText)
        );
    }

    #[test]
    fn test_summary_line_is_not_a_table_header() {
        let page = "תאריך הפקה 05/03/2024 יתרה לתאריך 9,500.00\n\
                    21,500.00 12,000.00 ס משכורת 02/03/2024";
        assert_eq!(detect_format(&pdf(page), 100), Some(SourceFormat::BankPdfText));

        let balance_only = "תאריך  תיאור  יתרה\n01/03/2024  קפה  9,500.00";
        assert_eq!(
            detect_format(&pdf(balance_only), 100),
            Some(SourceFormat::BankPdfText)
        );
    }

    #[test]
    fn test_detect_tables() {
        let bank = table(&[&["תאריך תנועה", "תאריך ערך", "תיאור", "סכום פעולה"]]);
        assert_eq!(detect_format(&bank, 100), Some(SourceFormat::BankExcel));

        let max = table(&[
            &["כל המשתמשים"],
            &["תאריך עסקה", "שם בית העסק", "4 ספרות אחרונות של כרטיס האשראי", "סכום חיוב"],
        ]);
        assert_eq!(detect_format(&max, 100), Some(SourceFormat::CardMax));

        let isracard = table(&[&["תאריך רכישה", "שם בית עסק", "סכום חיוב"]]);
        assert_eq!(detect_format(&isracard, 100), Some(SourceFormat::CardIsracard));
    }

    #[test]
    fn test_signature_beyond_scan_window() {
        let filler: &[&str] = &["filler"];
        let mut lines = vec![filler; 5];
        lines.push(&["תאריך רכישה", "שם בית עסק"]);
        let doc = table(&lines);
        assert_eq!(detect_format(&doc, 3), None);
        assert_eq!(detect_format(&doc, 10), Some(SourceFormat::CardIsracard));
    }

    #[test]
    fn test_unknown_table() {
        let doc = table(&[&["Date", "Description", "Amount"]]);
        assert_eq!(detect_format(&doc, 100), None);
    }
}
