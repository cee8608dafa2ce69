//! Isracard exports: CSV/XLSX statements and digital PDF statements
//!
//! Charges are reported as positive numbers and refunds as negative ones; the
//! assembler flips them into Kesef's convention.
//!
//! Tabular layout (header repeats per section):
//! ```text
//! עסקאות למועד חיוב 10/01/2025
//! תאריך רכישה, שם בית עסק, סכום עסקה, סכום חיוב, מס' שובר, ...
//! 02/12/2024, שופרסל דיל, 245.90, 245.90, 123456789
//! עסקאות שטרם נקלטו
//! ...
//! ```

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::section::{SectionEvent, SectionMachine};
use super::{cell_at, clean_reference, text_at, HeaderRow, RawAmount, RawRow};
use crate::document::{Cell, Sheet};
use crate::error::{Error, Result};
use crate::normalize::clean_amount;

const PENDING_MARKER: &str = "עסקאות שטרם נקלטו";
const VALID_MARKERS: &[&str] = &["עסקאות למועד חיוב", "עסקאות בחיוב"];

const DATE_TITLE: &str = "תאריך רכישה";
const DESCRIPTION_TITLES: &[&str] = &["שם בית עסק", "שם שיוך", "תיאור", "פרטים"];
const CHARGE_TITLE: &str = "סכום חיוב";
const DEAL_TITLE: &str = "סכום עסקה";
const REFERENCE_TITLES: &[&str] = &["מס' שובר", "מספר שובר", "שובר", "אסמכתא"];

fn row_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2}[./]\d{2}[./]\d{2,4}").expect("row date regex"))
}

fn pdf_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2}/\d{2}/\d{2,4}").expect("pdf date regex"))
}

fn pdf_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d{1,3}(?:,\d{3})*\.\d{2}").expect("pdf amount regex"))
}

fn numeric_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").expect("numeric token regex"))
}

/// Column positions of one header row
#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    description: usize,
    charge: Option<usize>,
    deal: Option<usize>,
    reference: Option<usize>,
}

impl Columns {
    /// A header row has the purchase date cell and a description cell
    fn from_row(values: &[String], row: &[Cell]) -> Option<Self> {
        if !values.iter().any(|v| v == DATE_TITLE) {
            return None;
        }
        let header = HeaderRow::new(row);
        let date = header.find_exact(&[DATE_TITLE])?;
        let description = header.find_exact(DESCRIPTION_TITLES)?;
        Some(Self {
            date,
            description,
            charge: header.find_exact(&[CHARGE_TITLE]),
            deal: header.find_exact(&[DEAL_TITLE]),
            reference: header.find_exact(REFERENCE_TITLES),
        })
    }

    fn has_amount(&self) -> bool {
        self.charge.is_some() || self.deal.is_some()
    }
}

fn classify(values: &[String], row: &[Cell]) -> (SectionEvent, Option<Columns>) {
    let joined = values.join(" ");
    if joined.contains(PENDING_MARKER) {
        return (SectionEvent::PendingMarker, None);
    }
    if VALID_MARKERS.iter().any(|m| joined.contains(m)) {
        return (SectionEvent::ValidMarker, None);
    }
    match Columns::from_row(values, row) {
        Some(columns) => (SectionEvent::Header, Some(columns)),
        None => (SectionEvent::DataRow, None),
    }
}

/// Parse every sheet of an Isracard export
pub(crate) fn parse_sheets(sheets: &[Sheet]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut header_found = false;
    let mut unusable_header = None;

    for sheet in sheets {
        let mut machine = SectionMachine::new();
        let mut columns: Option<Columns> = None;

        for row in &sheet.rows {
            let values = Sheet::row_values(row);
            let (event, header) = classify(&values, row);

            if let Some(found) = header {
                header_found = true;
                if found.has_amount() {
                    columns = Some(found);
                } else {
                    unusable_header = Some(HeaderRow::new(row).describe());
                }
            }

            if !machine.on(event) {
                continue;
            }
            let Some(columns) = columns else {
                continue;
            };
            if let Some(raw) = parse_row(row, &columns) {
                rows.push(raw);
            }
        }
    }

    if !header_found {
        return Err(Error::MissingColumns(format!(
            "no '{}' header row found",
            DATE_TITLE
        )));
    }
    if rows.is_empty() {
        if let Some(header) = unusable_header {
            return Err(Error::MissingColumns(format!(
                "no amount column in header [{}]",
                header
            )));
        }
    }

    debug!("Parsed {} Isracard rows from {} sheets", rows.len(), sheets.len());
    Ok(rows)
}

fn parse_row(row: &[Cell], columns: &Columns) -> Option<RawRow> {
    let date = cell_at(row, Some(columns.date)).clone();
    let is_dated = match &date {
        Cell::Date(_) => true,
        Cell::Text(s) => row_date_re().is_match(s) && !s.contains("תאריך"),
        _ => false,
    };
    if !is_dated {
        return None;
    }

    let mut amount = cell_at(row, columns.charge).as_amount();
    if amount == 0.0 {
        amount = cell_at(row, columns.deal).as_amount();
    }
    if amount == 0.0 {
        debug!("Skipping zero-amount Isracard row");
        return None;
    }

    let description = text_at(row, Some(columns.description))?;
    let mut raw = RawRow::new(date, &description, RawAmount::Signed(amount));
    raw.ref_id = text_at(row, columns.reference).and_then(|r| clean_reference(&r));
    Some(raw)
}

/// Parse the text of an Isracard digital PDF statement
///
/// Lines are matched permissively: any line with a date and a money amount is a
/// transaction; the first non-zero amount is the billed amount.
pub(crate) fn parse_pdf(pages: &[String]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();

    for line in pages.iter().flat_map(|p| p.lines()) {
        if let Some(raw) = parse_pdf_line(line.trim()) {
            rows.push(raw);
        }
    }

    debug!("Parsed {} Isracard PDF rows", rows.len());
    Ok(rows)
}

fn parse_pdf_line(line: &str) -> Option<RawRow> {
    let date = pdf_date_re().find(line)?.as_str();

    let amounts: Vec<&str> = pdf_amount_re().find_iter(line).map(|m| m.as_str()).collect();
    let amount = amounts
        .iter()
        .map(|a| clean_amount(a))
        .find(|v| v.abs() > 0.01)?;

    let mut rest = line.replacen(date, "", 1);
    for token in &amounts {
        rest = rest.replacen(token, "", 1);
    }
    for noise in ["₪", "ש'ח", "ש\"ח"] {
        rest = rest.replace(noise, "");
    }
    let rest = pdf_date_re().replace_all(&rest, "");

    let description = rest
        .split_whitespace()
        .filter(|token| !numeric_token_re().is_match(token))
        .collect::<Vec<_>>()
        .join(" ");

    // Statement totals, in logical or visual order
    if description.contains("סה\"כ") || description.contains("כ\"הס") {
        return None;
    }
    if description.is_empty() {
        return None;
    }

    Some(RawRow::new(
        Cell::Text(date.to_string()),
        &description,
        RawAmount::Signed(amount),
    ))
}
