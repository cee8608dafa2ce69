//! One Zero bank statements: Excel export and the two PDF layouts
//!
//! The Excel export carries one pre-signed amount column (debits are already
//! negative). PDF statements have separate debit and credit columns next to a
//! running balance, which must never be mistaken for the amount.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::{cell_at, clean_reference, text_at, HeaderRow, RawAmount, RawRow};
use crate::document::{Cell, Sheet};
use crate::error::{Error, Result};
use crate::normalize::clean_amount;

const DATE: &str = "תאריך";
const DEBIT: &str = "חובה";
const CREDIT: &str = "זכות";
const BALANCE: &str = "יתרה";
const REFERENCE: &str = "אסמכתא";

fn cell_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}|\t").expect("cell split regex"))
}

fn full_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("full date regex"))
}

fn money_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d{1,3}(,\d{3})*\.\d{2}$").expect("money token regex"))
}

fn reference_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5,}$").expect("reference token regex"))
}

fn plain_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?[\d,.]+$").expect("plain number regex"))
}

// ---------------------------------------------------------------------------
// Excel export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ExcelColumns {
    date: usize,
    description: usize,
    amount: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
    transaction_type: Option<usize>,
    reference: Option<usize>,
    bank_category: Option<usize>,
}

impl ExcelColumns {
    fn from_header(header: &HeaderRow) -> Option<Self> {
        let amount = header
            .find(&["סכום", "פעולה"], &[])
            .or_else(|| header.find(&["סכום"], &[]));
        let debit = header.find(&[DEBIT], &[]);
        let credit = header.find(&[CREDIT], &[]);
        if amount.is_none() && debit.is_none() && credit.is_none() {
            return None;
        }

        Some(Self {
            date: header
                .find(&[DATE, "תנועה"], &[])
                .or_else(|| header.find(&[DATE], &["ערך"]))?,
            description: header.find(&["תיאור"], &[])?,
            amount,
            debit,
            credit,
            transaction_type: header
                .find(&["חיוב"], &["סכום"])
                .or_else(|| header.find(&["זיכוי"], &["סכום"])),
            reference: header.find(&[REFERENCE], &[]),
            bank_category: header.find(&["סוג", "פעולה"], &[]),
        })
    }

    fn amount(&self, row: &[Cell]) -> RawAmount {
        // Exports with one amount column are already signed
        match self.amount {
            Some(idx) => RawAmount::Signed(cell_at(row, Some(idx)).as_amount()),
            None => RawAmount::DebitCredit {
                debit: cell_at(row, self.debit).as_amount(),
                credit: cell_at(row, self.credit).as_amount(),
            },
        }
    }
}

fn is_excel_header(row_text: &str) -> bool {
    row_text.contains(DATE)
        && row_text.contains("תיאור")
        && ["סכום", DEBIT, CREDIT].iter().any(|t| row_text.contains(t))
}

/// Parse a One Zero Excel export; every sheet with a header is read
pub(crate) fn parse_excel(sheets: &[Sheet]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut mapped_any = false;
    let mut unusable_header = None;

    for sheet in sheets {
        let Some(header_idx) = sheet
            .rows
            .iter()
            .position(|r| is_excel_header(&Sheet::row_text(r)))
        else {
            debug!("Sheet '{}' has no One Zero header, skipping", sheet.name);
            continue;
        };

        let header = HeaderRow::new(&sheet.rows[header_idx]);
        let Some(columns) = ExcelColumns::from_header(&header) else {
            unusable_header = Some(header.describe());
            continue;
        };
        mapped_any = true;

        for row in &sheet.rows[header_idx + 1..] {
            let Some(description) = text_at(row, Some(columns.description)) else {
                continue;
            };
            let mut raw = RawRow::new(
                cell_at(row, Some(columns.date)).clone(),
                &description,
                columns.amount(row),
            );
            raw.ref_id = text_at(row, columns.reference).and_then(|r| clean_reference(&r));
            raw.bank_category = text_at(row, columns.bank_category);
            raw.transaction_type = text_at(row, columns.transaction_type);
            rows.push(raw);
        }
    }

    if !mapped_any {
        return Err(Error::MissingColumns(match unusable_header {
            Some(header) => format!("One Zero export needs date, description and amount columns [{}]", header),
            None => "no One Zero header row found".to_string(),
        }));
    }

    debug!("Parsed {} One Zero Excel rows", rows.len());
    Ok(rows)
}

// ---------------------------------------------------------------------------
// PDF, table layout
// ---------------------------------------------------------------------------

/// A cell of a PDF text line with its character span
#[derive(Debug, Clone, Copy)]
struct SpannedCell<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

impl SpannedCell<'_> {
    fn center(&self) -> f64 {
        (self.start + self.end) as f64 / 2.0
    }
}

/// Split a line at runs of 2+ spaces or tabs, keeping character positions
fn spanned_cells(line: &str) -> Vec<SpannedCell<'_>> {
    let chars_before = |byte: usize| line[..byte].chars().count();
    let mut cells = Vec::new();
    let mut push = |from: usize, to: usize| {
        let raw = &line[from..to];
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        let lead = raw.len() - raw.trim_start().len();
        let start = chars_before(from + lead);
        cells.push(SpannedCell {
            text,
            start,
            end: start + text.chars().count(),
        });
    };

    let mut last = 0;
    for sep in cell_split_re().find_iter(line) {
        push(last, sep.start());
        last = sep.end();
    }
    push(last, line.len());
    cells
}

#[derive(Debug, Clone, Default)]
struct TableColumns {
    /// Header cell centers, in header order
    centers: Vec<f64>,
    date: Option<usize>,
    description: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
    balance: Option<usize>,
    reference: Option<usize>,
}

impl TableColumns {
    /// Each header cell maps to at most one column, first rule wins
    fn from_cells(cells: &[SpannedCell]) -> Self {
        let mut columns = Self {
            centers: cells.iter().map(SpannedCell::center).collect(),
            ..Self::default()
        };
        for (idx, cell) in cells.iter().enumerate() {
            let title = cell.text;
            if title.contains(DATE) && !title.contains("ערך") {
                columns.date.get_or_insert(idx);
            } else if title.contains("תיאור") || title.contains("פעולה") {
                columns.description.get_or_insert(idx);
            } else if title.contains(DEBIT) {
                columns.debit.get_or_insert(idx);
            } else if title.contains(CREDIT) {
                columns.credit.get_or_insert(idx);
            } else if title.contains(BALANCE) {
                columns.balance.get_or_insert(idx);
            } else if title.contains(REFERENCE) {
                columns.reference.get_or_insert(idx);
            }
        }
        columns
    }

    fn is_usable(&self) -> bool {
        self.date.is_some() && (self.debit.is_some() || self.credit.is_some())
    }

    fn width(&self) -> usize {
        self.centers.len()
    }

    /// Row cells laid out by header column
    ///
    /// A row with blank cells is placed by position: every cell goes to the
    /// header column nearest its center. `None` if two cells land on one
    /// column or the row has more cells than the header.
    fn align<'a>(&self, cells: &[SpannedCell<'a>]) -> Option<Vec<&'a str>> {
        if cells.len() == self.width() {
            return Some(cells.iter().map(|c| c.text).collect());
        }
        if cells.len() > self.width() {
            return None;
        }

        let mut slots = vec![None; self.width()];
        for cell in cells {
            let center = cell.center();
            let idx = self
                .centers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - center).abs().total_cmp(&(*b - center).abs()))
                .map(|(idx, _)| idx)?;
            if slots[idx].replace(cell.text).is_some() {
                return None;
            }
        }
        Some(slots.into_iter().map(|s| s.unwrap_or("")).collect())
    }

    fn cell<'a>(cells: &[&'a str], idx: Option<usize>) -> &'a str {
        idx.and_then(|i| cells.get(i)).copied().unwrap_or("")
    }

    /// Description column, or the non-numeric cells nobody claimed
    fn description(&self, cells: &[&str]) -> String {
        if self.description.is_some() {
            return Self::cell(cells, self.description).to_string();
        }
        let claimed = [self.date, self.debit, self.credit, self.balance, self.reference];
        cells
            .iter()
            .enumerate()
            .filter(|(idx, _)| !claimed.contains(&Some(*idx)))
            .map(|(_, c)| c.trim())
            .filter(|c| !c.is_empty() && !plain_number_re().is_match(c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn parse_line(&self, cells: &[SpannedCell]) -> Option<RawRow> {
        let cells = self.align(cells)?;
        let date = Cell::text(Self::cell(&cells, self.date));
        date.as_date()?;

        let amount = RawAmount::DebitCredit {
            debit: clean_amount(Self::cell(&cells, self.debit)),
            credit: clean_amount(Self::cell(&cells, self.credit)),
        };
        let mut raw = RawRow::new(date, &self.description(&cells), amount);
        raw.ref_id = clean_reference(Self::cell(&cells, self.reference));
        Some(raw)
    }
}

/// Header vocabulary without checking the columns are usable
fn mentions_table_header(line: &str) -> bool {
    line.contains(DATE) && [DEBIT, CREDIT, BALANCE].iter().any(|t| line.contains(t))
}

/// True for a PDF line that is a table header with a date and a debit or credit column
///
/// Summary lines such as "תאריך הפקה ... יתרה לתאריך" mention the same words
/// but do not qualify.
pub(crate) fn is_pdf_table_header(line: &str) -> bool {
    mentions_table_header(line) && TableColumns::from_cells(&spanned_cells(line)).is_usable()
}

/// Parse a One Zero PDF whose text keeps the table's column spacing
///
/// The header found on one page carries over to following pages that do not
/// repeat it.
pub(crate) fn parse_pdf_table(pages: &[String]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut columns: Option<TableColumns> = None;

    for (page_no, page) in pages.iter().enumerate() {
        for line in page.lines() {
            let cells = spanned_cells(line);
            if mentions_table_header(line) {
                let found = TableColumns::from_cells(&cells);
                if found.is_usable() {
                    columns = Some(found);
                    continue;
                }
                if !cells.iter().any(|c| full_date_re().is_match(c.text)) {
                    debug!("Page {}: ignoring header without amount columns", page_no + 1);
                    continue;
                }
            }
            let Some(columns) = &columns else {
                continue;
            };
            match columns.parse_line(&cells) {
                Some(raw) => rows.push(raw),
                None if cells.iter().any(|c| full_date_re().is_match(c.text)) => {
                    warn!(
                        "Page {}: skipping dated row that does not fit the table header: {}",
                        page_no + 1,
                        line.trim()
                    );
                }
                None => {}
            }
        }
    }

    if columns.is_none() {
        return Err(Error::MissingColumns(
            "no One Zero table header with debit/credit columns".to_string(),
        ));
    }

    debug!("Parsed {} One Zero PDF table rows", rows.len());
    Ok(rows)
}

// ---------------------------------------------------------------------------
// PDF, plain text layout
// ---------------------------------------------------------------------------

const TEXT_NOISE: &[&str] = &["₪", "ש\"ח", "ש”ח", "NIS"];

/// Parse a One Zero PDF flattened to plain text
///
/// Amount tokens appear in visual (right-to-left) order: balance, credit,
/// debit. A lone "ס" stands for an empty money cell.
pub(crate) fn parse_pdf_text(pages: &[String]) -> Result<Vec<RawRow>> {
    let rows: Vec<RawRow> = pages
        .iter()
        .flat_map(|p| p.lines())
        .filter_map(parse_text_line)
        .collect();
    debug!("Parsed {} One Zero PDF text rows", rows.len());
    Ok(rows)
}

fn parse_text_line(line: &str) -> Option<RawRow> {
    let mut date = None;
    let mut money = Vec::new();
    let mut reference = None;
    let mut words = Vec::new();

    for token in line.split_whitespace() {
        if full_date_re().is_match(token) {
            date.get_or_insert(token);
        } else if token == "ס" {
            money.push(0.0);
        } else if money_token_re().is_match(token) {
            money.push(clean_amount(token));
        } else if reference.is_none() && reference_token_re().is_match(token) {
            reference = Some(token);
        } else if !TEXT_NOISE.contains(&token) {
            words.push(token);
        }
    }

    let date = date?;
    if money.len() < 3 {
        return None;
    }

    let amount = RawAmount::DebitCredit {
        debit: money[2],
        credit: money[1],
    };
    let mut raw = RawRow::new(Cell::text(date), &words.join(" "), amount);
    raw.ref_id = reference.map(str::to_string);
    Some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sheet(lines: &[&[&str]]) -> Sheet {
        Sheet::new(
            "Sheet1",
            lines
                .iter()
                .map(|l| l.iter().map(|c| Cell::text(c)).collect())
                .collect(),
        )
    }

    const EXCEL_HEADER: &[&str] = &[
        "תאריך תנועה",
        "תאריך ערך",
        "סוג פעולה",
        "תיאור",
        "סכום פעולה",
        "מטבע",
        "חיוב/זיכוי",
        "יתרה",
        "אסמכתא",
    ];

    #[test]
    fn test_excel_keeps_presigned_amounts() {
        let mut sheet = sheet(&[
            &["דוח תנועות"],
            EXCEL_HEADER,
            &["", "", "העברה", "תרוכשמ", "12,500.00", "ILS", "זיכוי", "20000", "88877766.0"],
            &["", "", "כרטיס", "ישראכרט", "-720.78", "ILS", "חיוב", "19279.22", ""],
        ]);
        sheet.rows[2][0] = Cell::Number(45292.0);
        sheet.rows[3][0] = Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        let rows = parse_excel(&[sheet]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, RawAmount::Signed(12500.0));
        assert_eq!(rows[0].date.as_date(), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(rows[0].ref_id.as_deref(), Some("88877766"));
        assert_eq!(rows[0].bank_category.as_deref(), Some("העברה"));
        assert_eq!(rows[0].transaction_type.as_deref(), Some("זיכוי"));
        assert_eq!(rows[1].amount, RawAmount::Signed(-720.78));
    }

    #[test]
    fn test_excel_debit_credit_columns() {
        let sheet = sheet(&[
            &["תאריך", "תיאור", "חובה", "זכות"],
            &["01/01/2024", "שכירות", "5,000.00", ""],
            &["02/01/2024", "ריבית", "", "3.10"],
        ]);
        let rows = parse_excel(&[sheet]).unwrap();
        assert_eq!(
            rows[0].amount,
            RawAmount::DebitCredit {
                debit: 5000.0,
                credit: 0.0
            }
        );
        assert_eq!(
            rows[1].amount,
            RawAmount::DebitCredit {
                debit: 0.0,
                credit: 3.1
            }
        );
    }

    #[test]
    fn test_excel_missing_columns() {
        let no_header = sheet(&[&["a", "b"]]);
        assert!(matches!(
            parse_excel(&[no_header]),
            Err(Error::MissingColumns(_))
        ));

        let no_date = sheet(&[&["תאריך ערך", "תיאור", "סכום פעולה"]]);
        assert!(matches!(
            parse_excel(&[no_date]),
            Err(Error::MissingColumns(_))
        ));
    }

    #[test]
    fn test_pdf_table_ignores_balance() {
        let page = [
            "One Zero  דף חשבון",
            "תאריך  תאריך ערך  תיאור  אסמכתא  חובה  זכות  יתרה",
            "01/03/2024  01/03/2024  העברה לחשבון  123456  500.00  ס  9,500.00",
            "02/03/2024  02/03/2024  משכורת  654321  ס  12,000.00  21,500.00",
            "short line  1.00",
        ]
        .join("\n");

        let rows = parse_pdf_table(&[page]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "העברה לחשבון");
        assert_eq!(
            rows[0].amount,
            RawAmount::DebitCredit {
                debit: 500.0,
                credit: 0.0
            }
        );
        assert_eq!(rows[0].ref_id.as_deref(), Some("123456"));
        assert_eq!(
            rows[1].amount,
            RawAmount::DebitCredit {
                debit: 0.0,
                credit: 12000.0
            }
        );
    }

    #[test]
    fn test_pdf_table_header_carries_across_pages() {
        let first = "תאריך  תיאור  חובה  זכות\n01/03/2024  קפה  12.00  ס".to_string();
        let second = "05/03/2024  ספר  80.00  ס".to_string();
        let rows = parse_pdf_table(&[first, second]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_pdf_table_without_header() {
        let page = "01/03/2024  קפה  12.00".to_string();
        assert!(matches!(
            parse_pdf_table(&[page]),
            Err(Error::MissingColumns(_))
        ));
    }

    /// Pads every cell to a fixed width, the way PDF text keeps table columns
    fn aligned(cells: &[&str]) -> String {
        cells.iter().map(|c| format!("{:<14}", c)).collect()
    }

    #[test]
    fn test_pdf_table_places_cells_under_header_when_blank() {
        let page = [
            aligned(&["תאריך", "תיאור", "חובה", "זכות", "יתרה"]),
            aligned(&["01/03/2024", "העברה לחשבון", "500.00", "", "9,500.00"]),
            aligned(&["02/03/2024", "משכורת", "", "12,000.00", "21,500.00"]),
        ]
        .join("\n");

        let rows = parse_pdf_table(&[page]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "העברה לחשבון");
        assert_eq!(
            rows[0].amount,
            RawAmount::DebitCredit {
                debit: 500.0,
                credit: 0.0
            }
        );
        assert_eq!(rows[1].description, "משכורת");
        assert_eq!(
            rows[1].amount,
            RawAmount::DebitCredit {
                debit: 0.0,
                credit: 12000.0
            }
        );
    }

    #[test]
    fn test_pdf_table_skips_rows_wider_than_header() {
        let page = "תאריך  תיאור  חובה  זכות\n\
                    01/03/2024  קפה  12.00  ס  extra\n\
                    02/03/2024  ספר  80.00  ס"
            .to_string();
        let rows = parse_pdf_table(&[page]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "ספר");
    }

    #[test]
    fn test_summary_line_is_not_a_usable_header() {
        assert!(!is_pdf_table_header("תאריך הפקה 05/03/2024 יתרה לתאריך 9,500.00"));
        assert!(!is_pdf_table_header("תאריך  תיאור  יתרה"));
        assert!(is_pdf_table_header("תאריך  תיאור  חובה  זכות  יתרה"));

        let page = "תאריך הפקה 05/03/2024 יתרה לתאריך 9,500.00".to_string();
        assert!(matches!(
            parse_pdf_table(&[page]),
            Err(Error::MissingColumns(_))
        ));
    }

    #[test]
    fn test_pdf_text_visual_order() {
        let line = "9,500.00 ס 500.00 1234567 לחשבון העברה 01/03/2024 01/03/2024";
        let raw = parse_text_line(line).unwrap();
        assert_eq!(raw.date, Cell::Text("01/03/2024".into()));
        assert_eq!(
            raw.amount,
            RawAmount::DebitCredit {
                debit: 500.0,
                credit: 0.0
            }
        );
        assert_eq!(raw.ref_id.as_deref(), Some("1234567"));
        assert_eq!(raw.description, "לחשבון העברה");
    }

    #[test]
    fn test_pdf_text_needs_three_amounts() {
        assert!(parse_text_line("01/03/2024 יתרה 9,500.00").is_none());
        assert!(parse_text_line("9,500.00 ס 500.00 no date").is_none());
        let rows = parse_pdf_text(&["header\n21,500.00 12,000.00 ס משכורת 02/03/2024".into()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].amount,
            RawAmount::DebitCredit {
                debit: 0.0,
                credit: 12000.0
            }
        );
    }
}
