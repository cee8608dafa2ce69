//! Max card exports (CSV or multi-sheet XLSX)
//!
//! Each sheet carries its own header row (domestic and foreign-currency
//! transactions live on separate sheets). Amounts are unsigned; refunds are
//! recognized from the remarks column or the merchant name.

use tracing::debug;

use super::{cell_at, clean_reference, text_at, HeaderRow, RawAmount, RawRow};
use crate::document::Sheet;
use crate::error::{Error, Result};

const MERCHANT_TITLE: &str = "שם בית העסק";
const CARD_DIGITS_TITLE: &str = "4 ספרות אחרונות";

#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    description: usize,
    amount: usize,
    reference: Option<usize>,
    notes: Option<usize>,
    card: Option<usize>,
}

impl Columns {
    fn from_header(header: &HeaderRow) -> Option<Self> {
        Some(Self {
            date: header.find(&["תאריך עסקה"], &[])?,
            description: header.find(&[MERCHANT_TITLE], &[])?,
            amount: header
                .find(&["סכום חיוב"], &[])
                .or_else(|| header.find(&["סכום עסקה"], &[]))?,
            reference: header
                .find(&["שובר"], &[])
                .or_else(|| header.find(&["אסמכתא"], &[])),
            notes: header.find(&["הערות"], &[]),
            card: header.find(&[CARD_DIGITS_TITLE], &[]),
        })
    }
}

fn is_header(row_text: &str) -> bool {
    row_text.contains(MERCHANT_TITLE) && row_text.contains(CARD_DIGITS_TITLE)
}

/// Parse every sheet that has a Max header row
pub(crate) fn parse_sheets(sheets: &[Sheet]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut mapped_any = false;
    let mut unusable_header = None;

    for sheet in sheets {
        let Some(header_idx) = sheet
            .rows
            .iter()
            .position(|r| is_header(&Sheet::row_text(r)))
        else {
            debug!("Sheet '{}' has no Max header, skipping", sheet.name);
            continue;
        };

        let header = HeaderRow::new(&sheet.rows[header_idx]);
        let Some(columns) = Columns::from_header(&header) else {
            unusable_header = Some(header.describe());
            continue;
        };
        mapped_any = true;

        let before = rows.len();
        for row in &sheet.rows[header_idx + 1..] {
            let Some(description) = text_at(row, Some(columns.description)) else {
                continue;
            };
            let date = cell_at(row, Some(columns.date));
            if date.as_date().is_none() {
                debug!("Skipping Max row without a date: {}", description);
                continue;
            }

            let amount = cell_at(row, Some(columns.amount)).as_amount();
            let mut raw = RawRow::new(date.clone(), &description, RawAmount::Signed(amount));
            raw.ref_id = text_at(row, columns.reference).and_then(|r| clean_reference(&r));
            raw.notes = text_at(row, columns.notes);
            raw.card_hint = text_at(row, columns.card);
            rows.push(raw);
        }
        debug!("Sheet '{}': {} Max rows", sheet.name, rows.len() - before);
    }

    if !mapped_any {
        return Err(Error::MissingColumns(match unusable_header {
            Some(header) => format!("incomplete Max header [{}]", header),
            None => "no Max header row found".to_string(),
        }));
    }
    Ok(rows)
}
