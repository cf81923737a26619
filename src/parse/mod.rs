//! Extraction pipeline: gate check, page-type extractors, link harvesting
//! and secret redaction

pub mod basket;
pub mod explorer;
pub mod gate;
pub mod jsinfos;
pub mod payment;
pub mod redact;
pub mod tabs;
pub mod text;
pub mod view;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

/// Short content hash for change detection (first 16 hex chars of SHA-256).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// First non-empty text across a list of selectors, first match wins.
pub(crate) fn select_first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&sel).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// First numeric value across a list of selectors.
pub(crate) fn select_numeric(document: &Html, selectors: &[&str]) -> Option<f64> {
    for selector in selectors {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&sel) {
            let text = element.text().collect::<String>();
            if let Some(value) = text::extract_numeric(text.trim()) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable_and_short() {
        let a = content_hash("<html></html>");
        let b = content_hash("<html></html>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, content_hash("<html>x</html>"));
    }

    #[test]
    fn test_select_first_text_falls_through() {
        let document = Html::parse_document(r#"<div class="b">hit</div>"#);
        assert_eq!(
            select_first_text(&document, &[".a", ".b"]),
            Some("hit".to_string())
        );
        assert_eq!(select_first_text(&document, &[".a", ".c"]), None);
    }

    #[test]
    fn test_select_numeric() {
        let document = Html::parse_document(r#"<span class="ttc">1 234,56 €</span>"#);
        assert_eq!(select_numeric(&document, &[".ttc"]), Some(1234.56));
    }
}
