//! Basket line extraction from embedded `jBasketComposer(...)` calls
//!
//! The view page feeds its basket widget through a script call whose single
//! argument is JSON: either a list of line objects or an object wrapping the
//! list under `items` or `lines`. Field names vary between French and
//! English synonyms; they are normalized to a canonical schema while
//! unrecognized fields are preserved as-is.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Canonical field name and the synonyms it absorbs, in priority order
const FIELD_SYNONYMS: &[(&str, &[&str])] = &[
    ("name", &["name", "nom", "label", "libelle"]),
    ("ref", &["ref", "reference", "code", "sku"]),
    ("price", &["price", "prix", "amount", "montant"]),
    ("qtty", &["qtty", "quantity", "qty", "quantite"]),
    ("tax", &["tax", "tva", "vat"]),
    ("rate", &["rate", "taux", "tax_rate"]),
    ("subscription", &["subscription", "abonnement"]),
    ("sub_start", &["sub_start", "subscription_start", "debut_abonnement"]),
    ("total", &["total", "total_ht", "total_ttc"]),
];

fn composer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)jBasketComposer\s*\(\s*(\[[^\]]+\]|\{[^\}]+\})\s*\)")
            .expect("static basket pattern")
    })
}

/// Extracts all basket lines from a page's HTML.
pub fn extract_basket_lines(html: &str) -> Vec<Map<String, Value>> {
    let mut lines = Vec::new();
    if html.is_empty() {
        return lines;
    }

    for caps in composer_re().captures_iter(html) {
        let json_str = &caps[1];
        let parsed: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!(
                    "could not parse JSON from jBasketComposer: {}",
                    &json_str[..json_str.len().min(100)]
                );
                continue;
            }
        };

        match parsed {
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        lines.push(normalize_basket_item(map));
                    }
                }
            }
            Value::Object(map) => {
                let wrapped = map
                    .get("items")
                    .or_else(|| map.get("lines"))
                    .and_then(Value::as_array)
                    .cloned();
                match wrapped {
                    Some(items) => {
                        for item in items {
                            if let Value::Object(inner) = item {
                                lines.push(normalize_basket_item(inner));
                            }
                        }
                    }
                    None => lines.push(normalize_basket_item(map)),
                }
            }
            _ => {}
        }
    }

    lines
}

/// Normalizes one basket item to the canonical schema.
///
/// Each canonical key takes the first synonym present; every field that did
/// not feed a canonical key is carried through unchanged.
fn normalize_basket_item(item: Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::new();

    for (canonical, synonyms) in FIELD_SYNONYMS {
        for synonym in *synonyms {
            if let Some(value) = item.get(*synonym) {
                normalized.insert(canonical.to_string(), value.clone());
                break;
            }
        }
    }

    for (key, value) in item {
        if !normalized.contains_key(&key) {
            normalized.insert(key, value);
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_list_argument() {
        let html = r#"<script>jBasketComposer([
            {"nom": "Abonnement hebdo", "prix": 89.0, "qtty": 1},
            {"nom": "Caution", "prix": 500.0, "qtty": 1}
        ]);</script>"#;
        let lines = extract_basket_lines(html);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "Abonnement hebdo");
        assert_eq!(lines[0]["price"], 89.0);
    }

    #[test]
    fn test_extract_items_wrapper() {
        let html = r#"jBasketComposer({"items": [{"label": "Semaine 2024-08", "montant": 95}]})"#;
        let lines = extract_basket_lines(html);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["name"], "Semaine 2024-08");
        assert_eq!(lines[0]["price"], 95);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let html = r#"jBasketComposer([{"nom": "X", "internal_flag": true}])"#;
        let lines = extract_basket_lines(html);
        assert_eq!(lines[0]["internal_flag"], true);
        // The consumed synonym stays available under its original key too.
        assert_eq!(lines[0]["nom"], "X");
    }

    #[test]
    fn test_synonym_priority_order() {
        let item: Map<String, Value> =
            serde_json::from_value(json!({"price": 10, "montant": 20})).unwrap();
        let normalized = normalize_basket_item(item);
        assert_eq!(normalized["price"], 10);
    }

    #[test]
    fn test_malformed_json_skipped() {
        let html = "jBasketComposer([{broken json}])";
        assert!(extract_basket_lines(html).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_basket_lines("").is_empty());
        assert!(extract_basket_lines("<html></html>").is_empty());
    }
}
