//! Statement import: format adapters and the parse entry point
//!
//! Each adapter turns a loaded [`Document`] into [`RawRow`]s. The
//! [`StatementParser`] detects the format once, runs the matching adapter and
//! assembles canonical transactions. Parsing never fails outward: problems are
//! reported through [`ParseReport::issue`].

mod isracard;
mod max;
mod onezero;
pub mod section;

pub(crate) use onezero::is_pdf_table_header;

use tracing::{debug, info, warn};

use crate::assemble::Assembler;
use crate::categorize::Categorizer;
use crate::config::{Config, ImportConfig};
use crate::detect::detect_format;
use crate::document::{Cell, Document};
use crate::error::{Error, Result};
use crate::models::{ParseIssue, ParseReport, SourceFormat};
use crate::profile::{SpenderResolver, UserProfile};

/// Amount as found in the source, before any sign policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawAmount {
    /// Single amount column
    Signed(f64),
    /// Separate debit and credit columns
    DebitCredit { debit: f64, credit: f64 },
}

/// One transaction-like row extracted by an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub date: Cell,
    pub description: String,
    pub amount: RawAmount,
    pub ref_id: Option<String>,
    pub bank_category: Option<String>,
    pub transaction_type: Option<String>,
    /// Free-text remarks column (refund hints)
    pub notes: Option<String>,
    /// Extra text searched for card numbers (e.g. a last-4-digits column)
    pub card_hint: Option<String>,
}

impl RawRow {
    pub fn new(date: Cell, description: &str, amount: RawAmount) -> Self {
        Self {
            date,
            description: description.trim().to_string(),
            amount,
            ref_id: None,
            bank_category: None,
            transaction_type: None,
            notes: None,
            card_hint: None,
        }
    }
}

/// Column headers of a tabular statement
#[derive(Debug, Clone)]
pub(crate) struct HeaderRow {
    cells: Vec<String>,
}

impl HeaderRow {
    pub(crate) fn new(row: &[Cell]) -> Self {
        Self {
            cells: row.iter().map(|c| c.as_text().replace('\n', " ")).collect(),
        }
    }

    /// First column whose title contains every needle and none of the exclusions
    pub(crate) fn find(&self, needles: &[&str], excluded: &[&str]) -> Option<usize> {
        self.cells.iter().position(|title| {
            needles.iter().all(|n| title.contains(n)) && !excluded.iter().any(|x| title.contains(x))
        })
    }

    /// First column whose title is exactly one of the names, in name order
    pub(crate) fn find_exact(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.cells.iter().position(|title| title == name))
    }

    pub(crate) fn describe(&self) -> String {
        self.cells
            .iter()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

pub(crate) fn cell_at(row: &[Cell], idx: Option<usize>) -> &Cell {
    idx.and_then(|i| row.get(i)).unwrap_or(&EMPTY_CELL)
}

/// Non-empty text of a cell
pub(crate) fn text_at(row: &[Cell], idx: Option<usize>) -> Option<String> {
    let text = cell_at(row, idx).as_text();
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(text.to_string())
    }
}

/// Reference numbers exported through spreadsheets pick up a `.0` suffix
pub(crate) fn clean_reference(raw: &str) -> Option<String> {
    let head = raw.trim().split('.').next().unwrap_or_default().trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

/// Run the adapter for a detected format
pub fn extract_rows(document: &Document, format: SourceFormat) -> Result<Vec<RawRow>> {
    let rows = match format {
        SourceFormat::BankPdfTable => onezero::parse_pdf_table(document.pages()),
        SourceFormat::BankPdfText => onezero::parse_pdf_text(document.pages()),
        SourceFormat::BankExcel => onezero::parse_excel(document.sheets()),
        SourceFormat::CardIsracard => isracard::parse_sheets(document.sheets()),
        SourceFormat::CardMax => max::parse_sheets(document.sheets()),
        SourceFormat::CardPdf => isracard::parse_pdf(document.pages()),
    }?;
    debug!("{} adapter produced {} raw rows", format, rows.len());
    Ok(rows)
}

/// Parses uploaded statement files into canonical transactions
pub struct StatementParser {
    profile: UserProfile,
    categorizer: Categorizer,
    import: ImportConfig,
}

impl StatementParser {
    pub fn new(config: &Config) -> Self {
        Self {
            categorizer: Categorizer::new(&config.profile),
            profile: config.profile.clone(),
            import: config.import.clone(),
        }
    }

    pub fn with_profile(profile: UserProfile) -> Self {
        Self::new(&Config {
            profile,
            ..Config::default()
        })
    }

    /// Parse one uploaded file
    pub fn parse(&self, bytes: &[u8], filename: &str) -> ParseReport {
        let document = match Document::from_bytes(bytes, filename) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Could not read {}: {}", filename, e);
                return ParseReport::failed(None, ParseIssue::Unreadable(e.to_string()));
            }
        };
        self.parse_document(&document, filename)
    }

    /// Parse an already loaded document
    pub fn parse_document(&self, document: &Document, filename: &str) -> ParseReport {
        let Some(format) = detect_format(document, self.import.detect_scan_rows) else {
            info!("Unrecognized statement format: {}", filename);
            return ParseReport::failed(None, ParseIssue::Unrecognized);
        };

        let (format, extracted) = match extract_rows(document, format) {
            Ok(rows) if rows.is_empty() && format == SourceFormat::BankPdfTable => {
                self.retry_as_text(document, filename, "table has no rows")
            }
            Err(Error::MissingColumns(detail)) if format == SourceFormat::BankPdfTable => {
                self.retry_as_text(document, filename, &detail)
            }
            other => (format, other),
        };

        let rows = match extracted {
            Ok(rows) => rows,
            Err(Error::MissingColumns(detail)) => {
                warn!("{} ({}): {}", filename, format, detail);
                return ParseReport::failed(Some(format), ParseIssue::MissingColumns(detail));
            }
            Err(e) => {
                warn!("{} ({}): {}", filename, format, e);
                return ParseReport::failed(Some(format), ParseIssue::Unreadable(e.to_string()));
            }
        };

        let spenders = SpenderResolver::new(&self.profile, &document.full_text());
        let assembler = Assembler::new(format, &self.categorizer, spenders, filename);
        let total = rows.len();
        let transactions: Vec<_> = rows
            .into_iter()
            .filter_map(|row| assembler.assemble(row))
            .collect();

        debug!(
            "Parsed {} {} transactions from {} ({} rows skipped)",
            transactions.len(),
            format,
            filename,
            total - transactions.len()
        );

        ParseReport {
            format: Some(format),
            transactions,
            issue: None,
        }
    }

    /// A One Zero PDF whose table layout did not hold up is read as free text
    fn retry_as_text(
        &self,
        document: &Document,
        filename: &str,
        reason: &str,
    ) -> (SourceFormat, Result<Vec<RawRow>>) {
        info!("{}: reading PDF as plain text ({})", filename, reason);
        let format = SourceFormat::BankPdfText;
        (format, extract_rows(document, format))
    }
}

/// Detect the statement format of a file and parse it
///
/// Never fails: an unreadable or unrecognized file yields an empty report
/// with `issue` set.
pub fn detect_and_parse(bytes: &[u8], filename: &str, profile: &UserProfile) -> ParseReport {
    StatementParser::with_profile(profile.clone()).parse(bytes, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_row_find() {
        let header = HeaderRow::new(&[
            Cell::text("תאריך תנועה"),
            Cell::text("תאריך ערך"),
            Cell::text("סכום פעולה"),
        ]);
        assert_eq!(header.find(&["תאריך"], &["ערך"]), Some(0));
        assert_eq!(header.find(&["תאריך", "ערך"], &[]), Some(1));
        assert_eq!(header.find(&["יתרה"], &[]), None);
        assert_eq!(header.find_exact(&["סכום חיוב", "סכום פעולה"]), Some(2));
    }

    #[test]
    fn test_clean_reference() {
        assert_eq!(clean_reference("123456.0"), Some("123456".to_string()));
        assert_eq!(clean_reference(" 98765 "), Some("98765".to_string()));
        assert_eq!(clean_reference(""), None);
    }

    #[test]
    fn test_text_at_out_of_range() {
        let row = vec![Cell::text("a")];
        assert_eq!(text_at(&row, Some(0)), Some("a".to_string()));
        assert_eq!(text_at(&row, Some(3)), None);
        assert_eq!(text_at(&row, None), None);
    }

    #[test]
    fn test_unrecognized_csv_reports_issue() {
        let report = detect_and_parse(
            b"Date,Description,Amount\n01/01/2024,Coffee,-3.50\n",
            "other.csv",
            &UserProfile::default(),
        );
        assert!(report.transactions.is_empty());
        assert_eq!(report.issue, Some(ParseIssue::Unrecognized));
        assert_eq!(report.format, None);
    }

    #[test]
    fn test_table_pdf_without_rows_falls_back_to_text() {
        let page = "תאריך  תיאור  חובה  זכות  יתרה\n\
                    9,500.00 ס 500.00 1234567 לחשבון העברה 01/03/2024 01/03/2024\n\
                    21,500.00 12,000.00 ס משכורת 02/03/2024";
        let document = Document::Pdf {
            pages: vec![page.to_string()],
        };
        let report = StatementParser::with_profile(UserProfile::default())
            .parse_document(&document, "onezero.pdf");

        assert!(report.issue.is_none());
        assert_eq!(report.format, Some(SourceFormat::BankPdfText));
        assert_eq!(report.transactions.len(), 2);
        assert!(report.transactions.iter().any(|t| t.amount == -500.0));
        assert!(report.transactions.iter().any(|t| t.amount == 12000.0));
    }

    #[test]
    fn test_summary_line_pdf_reads_as_text() {
        let page = "תאריך הפקה 05/03/2024 יתרה לתאריך 9,500.00\n\
                    9,500.00 ס 500.00 1234567 לחשבון העברה 01/03/2024 01/03/2024\n\
                    21,500.00 12,000.00 ס משכורת 02/03/2024";
        let document = Document::Pdf {
            pages: vec![page.to_string()],
        };
        let report = StatementParser::with_profile(UserProfile::default())
            .parse_document(&document, "onezero.pdf");

        assert!(report.issue.is_none());
        assert_eq!(report.format, Some(SourceFormat::BankPdfText));
        assert_eq!(report.transactions.len(), 2);
    }

    #[test]
    fn test_unreadable_file_reports_issue() {
        let report = detect_and_parse(b"garbage", "statement.pdf", &UserProfile::default());
        assert!(report.transactions.is_empty());
        assert!(matches!(report.issue, Some(ParseIssue::Unreadable(_))));
    }
}
