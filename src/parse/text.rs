//! Small text normalization helpers shared by the extractors
//!
//! The source site renders numbers in French conventions (spaces as
//! thousands separators, decimal comma, trailing currency symbol) and dates
//! in a handful of formats.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Date formats seen on the site, most common first
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"];

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d.]+").expect("static number pattern"))
}

fn date_in_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})-(\d{2})-(\d{2})|(\d{2})/(\d{2})/(\d{4})|(\d{2})\.(\d{2})\.(\d{4})")
            .expect("static date pattern")
    })
}

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([€$£]|EUR|USD|GBP)").expect("static currency pattern"))
}

/// Extracts a numeric value from free text.
///
/// Handles French formats: spaces and non-breaking spaces are stripped, the
/// decimal comma becomes a point, currency symbols are dropped.
pub fn extract_numeric(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    let cleaned: String = text
        .replace([' ', '\u{a0}'], "")
        .replace(',', ".")
        .replace(['€', '$', '£'], "");
    let m = number_re().find(&cleaned)?;
    m.as_str().parse::<f64>().ok()
}

/// Extracts the currency marker from an amount string; `€` maps to `EUR`.
pub fn extract_currency(text: &str) -> Option<String> {
    let m = currency_re().find(text)?;
    let cur = m.as_str();
    Some(if cur == "€" { "EUR".to_string() } else { cur.to_string() })
}

/// Parses a whole date string against the known formats, ISO output.
///
/// Returns the input unchanged when no format matches, so callers never
/// lose the raw value.
pub fn parse_date(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    Some(trimmed.to_string())
}

/// Finds a date anywhere inside free text and returns it in ISO form.
pub fn find_date_iso(text: &str) -> Option<String> {
    let caps = date_in_text_re().captures(text)?;
    if let (Some(y), Some(m), Some(d)) = (caps.get(1), caps.get(2), caps.get(3)) {
        return Some(format!("{}-{}-{}", y.as_str(), m.as_str(), d.as_str()));
    }
    if let (Some(d), Some(m), Some(y)) = (caps.get(4), caps.get(5), caps.get(6)) {
        return Some(format!("{}-{}-{}", y.as_str(), m.as_str(), d.as_str()));
    }
    if let (Some(d), Some(m), Some(y)) = (caps.get(7), caps.get(8), caps.get(9)) {
        return Some(format!("{}-{}-{}", y.as_str(), m.as_str(), d.as_str()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_numeric_plain() {
        assert_eq!(extract_numeric("42"), Some(42.0));
        assert_eq!(extract_numeric("3.14"), Some(3.14));
    }

    #[test]
    fn test_extract_numeric_french_amount() {
        assert_eq!(extract_numeric("210,00 €"), Some(210.0));
        assert_eq!(extract_numeric("1 234,56"), Some(1234.56));
    }

    #[test]
    fn test_extract_numeric_none_on_text() {
        assert_eq!(extract_numeric("n/a"), None);
        assert_eq!(extract_numeric(""), None);
    }

    #[test]
    fn test_extract_currency() {
        assert_eq!(extract_currency("210,00 €"), Some("EUR".to_string()));
        assert_eq!(extract_currency("$12"), Some("$".to_string()));
        assert_eq!(extract_currency("12.00"), None);
    }

    #[test]
    fn test_parse_date_known_formats() {
        assert_eq!(parse_date("25/12/2023"), Some("2023-12-25".to_string()));
        assert_eq!(parse_date("2023-12-25"), Some("2023-12-25".to_string()));
        assert_eq!(parse_date("25.12.2023"), Some("2023-12-25".to_string()));
    }

    #[test]
    fn test_parse_date_passthrough_on_unknown() {
        assert_eq!(parse_date("demain"), Some("demain".to_string()));
        assert_eq!(parse_date("  "), None);
    }

    #[test]
    fn test_find_date_iso_inside_text() {
        assert_eq!(
            find_date_iso("Réalisé le 03/02/2024 à 10h"),
            Some("2024-02-03".to_string())
        );
        assert_eq!(find_date_iso("2024-02-03T10:00"), Some("2024-02-03".to_string()));
        assert_eq!(find_date_iso("no date here"), None);
    }
}
