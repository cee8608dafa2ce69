//! Field normalization for raw statement values
//!
//! Israeli bank and card exports mix locale date formats, spreadsheet serials,
//! currency noise around amounts and visually-ordered (reversed) Hebrew text.
//! Everything here is infallible: bad input yields `None` or `0.0`.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// Date layouts tried in order; the first that parses wins.
///
/// Each layout carries a shape check so that a four-digit year is never
/// accepted by a two-digit pattern (and vice versa).
const DATE_FORMATS: &[(&str, &str)] = &[
    (r"^\d{1,2}/\d{1,2}/\d{4}$", "%d/%m/%Y"),
    (r"^\d{1,2}-\d{1,2}-\d{4}$", "%d-%m-%Y"),
    (r"^\d{1,2}\.\d{1,2}\.\d{4}$", "%d.%m.%Y"),
    (r"^\d{1,2}\.\d{1,2}\.\d{2}$", "%d.%m.%y"),
    (r"^\d{1,2}/\d{1,2}/\d{2}$", "%d/%m/%y"),
    (r"^\d{4}-\d{1,2}-\d{1,2}$", "%Y-%m-%d"),
];

fn date_shapes() -> &'static [(Regex, &'static str)] {
    static SHAPES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        DATE_FORMATS
            .iter()
            .map(|(shape, fmt)| (Regex::new(shape).expect("date shape regex"), *fmt))
            .collect()
    })
}

fn reference_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{5,}\b").expect("reference regex"))
}

/// Currency markers stripped from amounts (longest first)
const CURRENCY_NOISE: &[&str] = &["ש\"\"ח", "ש\"ח", "ש”ח", "ח\"ש", "₪", "NIS"];

/// Artifacts replaced by a space in descriptions
const DESCRIPTION_NOISE: &[&str] = &["ש\"ח", "ש”ח", "NIS", "/"];

/// Lowercase, trim and collapse whitespace runs to a single space.
///
/// Only used for hashing and similarity, never for display.
pub fn normalize_description(description: &str) -> String {
    description
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a date written in one of the supported locale formats
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    date_shapes()
        .iter()
        .filter(|(shape, _)| shape.is_match(s))
        .find_map(|(_, fmt)| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Convert a spreadsheet day-count serial (epoch 1899-12-30) to a date
///
/// Fractional days (time of day) are truncated.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // 2958465 is 9999-12-31, the last date spreadsheets can represent
    if !serial.is_finite() || !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Clean a currency-tainted amount string. Never fails; unparseable input is `0.0`.
pub fn clean_amount(value: &str) -> f64 {
    let s = value.trim();
    if s.is_empty() {
        return 0.0;
    }

    // One Zero renders a zero cell as "ס" or "ס ש""ח"
    if (s.starts_with('ס') || s.contains("ס ש")) && !s.chars().any(|c| c.is_ascii_digit()) {
        return 0.0;
    }

    let mut cleaned = s.to_string();
    for noise in CURRENCY_NOISE {
        cleaned = cleaned.replace(noise, "");
    }
    let mut numeric: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    // RTL exports sometimes render the minus sign after the number
    if numeric.len() > 1 && numeric.ends_with('-') && !numeric.starts_with('-') {
        numeric.pop();
        numeric.insert(0, '-');
    }

    numeric.parse::<f64>().unwrap_or(0.0)
}

/// True if the text contains at least one Hebrew letter (א..ת)
pub fn contains_hebrew(s: &str) -> bool {
    s.chars().any(|c| ('\u{05D0}'..='\u{05EA}').contains(&c))
}

/// Reverse the character order of a string
pub fn reverse_chars(s: &str) -> String {
    s.chars().rev().collect()
}

/// Replace currency artifacts, drop reference-number runs (5+ digits) and collapse spaces
pub fn scrub_description(description: &str) -> String {
    let mut s = description.replace('\n', " ");
    for noise in DESCRIPTION_NOISE {
        s = s.replace(noise, " ");
    }
    let s = reference_run_re().replace_all(&s, "");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How an adapter repairs visually-ordered Hebrew text
///
/// There is no reliable signal for when an export reversed its text, so each
/// adapter declares what its source is known to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtlRepair {
    /// Text is in logical order
    Off,
    /// Text is always reversed when it contains Hebrew
    ReverseHebrew,
    /// Unknown: display raw text but search both orders when categorizing
    SearchBothOrders,
}

impl RtlRepair {
    /// Description shown to the user
    pub fn display(&self, raw: &str) -> String {
        match self {
            Self::ReverseHebrew if contains_hebrew(raw) => reverse_chars(raw),
            _ => raw.to_string(),
        }
    }

    /// Lowercased text searched by category rules
    pub fn search_text(&self, raw: &str) -> String {
        match self {
            Self::Off => raw.to_lowercase(),
            Self::ReverseHebrew => self.display(raw).to_lowercase(),
            Self::SearchBothOrders => format!("{} {}", raw, reverse_chars(raw)).to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_description() {
        assert_eq!(
            normalize_description("  Supermarket   TLV  "),
            "supermarket tlv"
        );
        assert_eq!(normalize_description("שופרסל\tדיל"), "שופרסל דיל");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(parse_date("31/12/2024"), Some(expected));
        assert_eq!(parse_date("31-12-2024"), Some(expected));
        assert_eq!(parse_date("31.12.2024"), Some(expected));
        assert_eq!(parse_date("31.12.24"), Some(expected));
        assert_eq!(parse_date("31/12/24"), Some(expected));
        assert_eq!(parse_date("2024-12-31"), Some(expected));
        assert_eq!(parse_date(" 31/12/2024 "), Some(expected));
    }

    #[test]
    fn test_parse_date_rejects_invalid() {
        assert_eq!(parse_date("13/13/2024"), None);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("12/31/2024"), None);
        assert_eq!(parse_date("תאריך רכישה"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(
            excel_serial_to_date(45292.0),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            excel_serial_to_date(45292.75),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(excel_serial_to_date(f64::NAN), None);
        assert_eq!(excel_serial_to_date(-1.0), None);
    }

    #[test]
    fn test_clean_amount() {
        assert_eq!(clean_amount("1,200.50 ₪"), 1200.50);
        assert_eq!(clean_amount("-720.78"), -720.78);
        assert_eq!(clean_amount("₪ 45.90"), 45.90);
        assert_eq!(clean_amount("45.90 ש\"ח"), 45.90);
        assert_eq!(clean_amount("12 NIS"), 12.0);
        assert_eq!(clean_amount("150.00-"), -150.0);
    }

    #[test]
    fn test_clean_amount_noise_is_zero() {
        assert_eq!(clean_amount("ש\"ח"), 0.0);
        assert_eq!(clean_amount("ס"), 0.0);
        assert_eq!(clean_amount("ס ש\"\"ח"), 0.0);
        assert_eq!(clean_amount(""), 0.0);
        assert_eq!(clean_amount("abc"), 0.0);
        assert_eq!(clean_amount("1.2.3"), 0.0);
    }

    #[test]
    fn test_scrub_description() {
        assert_eq!(
            scrub_description("העברה 1234567 לחשבון ש\"ח"),
            "העברה לחשבון"
        );
        assert_eq!(scrub_description("AMAZON/PRIME 1234"), "AMAZON PRIME 1234");
    }

    #[test]
    fn test_rtl_repair_policies() {
        assert_eq!(RtlRepair::ReverseHebrew.display("לגנ"), "נגל");
        assert_eq!(RtlRepair::ReverseHebrew.display("AMAZON"), "AMAZON");
        assert_eq!(RtlRepair::Off.display("לגנ"), "לגנ");

        let both = RtlRepair::SearchBothOrders.search_text("תרוכשמ");
        assert!(both.contains("משכורת"));
        assert_eq!(RtlRepair::SearchBothOrders.display("תרוכשמ"), "תרוכשמ");
    }
}
