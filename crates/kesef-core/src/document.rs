//! Uniform in-memory view of an uploaded statement file
//!
//! A statement is either PDF text (one string per page) or a set of sheets of
//! cells. CSV files become a single sheet; spreadsheets keep every sheet.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::normalize::{clean_amount, excel_serial_to_date, parse_date};

/// A single spreadsheet/CSV cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Cell rendered as text; integral numbers have no trailing `.0`
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Date(d) => d.format("%d/%m/%Y").to_string(),
        }
    }

    /// Cell as a date: native dates, spreadsheet serials or locale strings
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Number(n) => excel_serial_to_date(*n),
            Self::Text(s) => parse_date(s),
            Self::Empty => None,
        }
    }

    /// Cell as an amount; text goes through `clean_amount`
    pub fn as_amount(&self) -> f64 {
        match self {
            Self::Number(n) if n.is_finite() => *n,
            Self::Text(s) => clean_amount(s),
            _ => 0.0,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::text(s),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
                .map(Cell::Date)
                .unwrap_or(Cell::Empty),
            Data::DateTimeIso(s) => s
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .map(Cell::Date)
                .unwrap_or_else(|| Cell::text(s)),
            Data::DurationIso(s) => Cell::text(s),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// One sheet of a spreadsheet, or the whole of a CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }

    /// Row cells as trimmed strings
    pub fn row_values(row: &[Cell]) -> Vec<String> {
        row.iter().map(Cell::as_text).collect()
    }

    /// Non-empty cells of a row joined by spaces
    pub fn row_text(row: &[Cell]) -> String {
        row.iter()
            .filter(|c| !c.is_empty())
            .map(Cell::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The first `limit` rows as one string, for signature matching
    pub fn head_text(&self, limit: usize) -> String {
        self.rows
            .iter()
            .take(limit)
            .map(|r| Self::row_text(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A statement file loaded into memory
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// Extracted PDF text, one entry per page
    Pdf { pages: Vec<String> },
    /// CSV (one sheet) or spreadsheet (every sheet)
    Table { sheets: Vec<Sheet> },
}

impl Document {
    /// Load a document from raw bytes
    ///
    /// PDF is recognized by extension or magic bytes. Anything that looks like
    /// text is read as CSV (UTF-8, falling back to ISO-8859-8); everything else
    /// is handed to the spreadsheet reader.
    pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidData(format!("{} is empty", filename)));
        }
        if is_pdf(bytes, filename) {
            return read_pdf(bytes);
        }
        if looks_like_text(bytes) {
            let sheet = read_csv(bytes)?;
            return Ok(Self::Table {
                sheets: vec![sheet],
            });
        }
        read_workbook(bytes)
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf { .. })
    }

    /// All text in the document, used for file-owner detection
    pub fn full_text(&self) -> String {
        match self {
            Self::Pdf { pages } => pages.join("\n"),
            Self::Table { sheets } => sheets
                .iter()
                .map(|s| s.head_text(usize::MAX))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        match self {
            Self::Table { sheets } => sheets,
            Self::Pdf { .. } => &[],
        }
    }

    pub fn pages(&self) -> &[String] {
        match self {
            Self::Pdf { pages } => pages,
            Self::Table { .. } => &[],
        }
    }
}

fn is_pdf(bytes: &[u8], filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf") || bytes.starts_with(b"%PDF")
}

/// Not a ZIP (xlsx) or OLE (xls) container and no NUL bytes near the start
fn looks_like_text(bytes: &[u8]) -> bool {
    const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
    const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        return false;
    }
    !bytes.iter().take(8192).any(|b| *b == 0)
}

/// Decode CSV bytes: UTF-8 (BOM stripped) or ISO-8859-8
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("CSV is not valid UTF-8, decoding as ISO-8859-8");
            let (text, _) = encoding_rs::ISO_8859_8.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

fn read_csv(bytes: &[u8]) -> Result<Sheet> {
    let text = decode_text(bytes);
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record?.iter().map(Cell::text).collect());
    }

    debug!("Read {} CSV rows", rows.len());
    Ok(Sheet::new("csv", rows))
}

fn read_workbook(bytes: &[u8]) -> Result<Document> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| Error::Spreadsheet(format!("Failed to open workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let rows: Vec<Vec<Cell>> = range
                    .rows()
                    .map(|row| row.iter().map(Cell::from).collect())
                    .collect();
                debug!("Read sheet '{}' with {} rows", name, rows.len());
                sheets.push(Sheet::new(&name, rows));
            }
            Err(e) => warn!("Skipping unreadable sheet '{}': {}", name, e),
        }
    }

    if sheets.is_empty() {
        return Err(Error::Spreadsheet("Workbook has no readable sheets".into()));
    }
    Ok(Document::Table { sheets })
}

fn read_pdf(bytes: &[u8]) -> Result<Document> {
    // pdf-extract panics on some malformed files instead of returning an error
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| Error::Pdf("PDF text extraction aborted".into()))?
        .map_err(|e| Error::Pdf(format!("Failed to extract text from PDF: {}", e)))?;

    let pages: Vec<String> = extracted
        .split('\u{000C}')
        .map(str::to_string)
        .filter(|p| !p.trim().is_empty())
        .collect();

    if pages.is_empty() {
        return Err(Error::Pdf("PDF contains no text".into()));
    }
    debug!("Extracted {} PDF pages", pages.len());
    Ok(Document::Pdf { pages })
}
