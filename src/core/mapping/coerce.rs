//! Parsing of OCR text into typed values.
//!
//! Extraction output mixes locales: `1.234,56` and `1,234.56` both occur,
//! as do currency symbols glued to amounts and values repeated by the
//! layout model (`"03.12.2020 03.12.2020"`).

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::codelists::collapse_repeated_tokens;

/// Largest magnitude accepted for any extracted number.
const MAX_MAGNITUDE: Decimal = dec!(1000000000000000);

/// Parse a locale-formatted decimal.
///
/// The separator occurring last is the decimal separator when both `.` and
/// `,` appear. A lone separator is decimal unless it repeats (`1.234.567`).
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = collapse_repeated_tokens(text.trim());
    let mut cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    // "12,50-" is a German negative.
    if cleaned.ends_with('-') && !cleaned.starts_with('-') {
        cleaned.pop();
        cleaned.insert(0, '-');
    }
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    let normalized = match (commas, dots) {
        (0, 0) => cleaned,
        (_, 0) if commas > 1 => cleaned.replace(',', ""),
        (_, 0) => cleaned.replace(',', "."),
        (0, _) if dots > 1 => cleaned.replace('.', ""),
        (0, _) => cleaned,
        _ => {
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    let value = Decimal::from_str(&normalized).ok()?;
    within_range(value)
}

/// Reject numbers no invoice carries; keeps later arithmetic in range.
pub fn within_range(value: Decimal) -> Option<Decimal> {
    (value.abs() <= MAX_MAGNITUDE).then_some(value)
}

/// Parse a percentage, with or without a trailing `%`.
pub fn parse_percent(text: &str) -> Option<Decimal> {
    parse_decimal(text.trim().trim_end_matches('%'))
}

/// Parse `YYYY-MM-DD`, `DD.MM.YYYY` or `DD/MM/YYYY`. A time part after an
/// ISO date is ignored.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = collapse_repeated_tokens(text.trim());
    let text = text.as_str();
    for format in ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    text.get(..10)
        .filter(|_| text.as_bytes().get(10) == Some(&b'T'))
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
}

/// Trimmed text; `None` when nothing is left.
pub fn clean_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Identifier with duplicated tokens collapsed.
pub fn clean_identifier(text: &str) -> Option<String> {
    clean_text(&collapse_repeated_tokens(text.trim()))
}

/// Identifier compacted the way VAT ids and IBANs are written in XML:
/// upper case, no whitespace.
pub fn compact_identifier(text: &str) -> Option<String> {
    let compact: String = collapse_repeated_tokens(text.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    (!compact.is_empty()).then_some(compact)
}
