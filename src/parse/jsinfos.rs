//! Decoding of embedded `span.JSinfos.base64` data blobs
//!
//! The site passes structured data to client-side script through inline
//! spans whose text is base64-encoded JSON. Blobs are decoded tolerantly
//! (missing padding is repaired), the `gmKey` secret is masked in place,
//! and each blob is filed under a stable, title-derived key.

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeError, Engine as _};
use scraper::{Html, Selector};
use serde_json::{Map, Value};

const JSINFOS_MASK: &str = "[MASKED]";

/// Decodes base64 after repairing missing padding.
///
/// The site emits blobs with the trailing `=` stripped; re-padding to a
/// multiple of four makes those decode cleanly.
pub fn decode_base64_padded(data: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = data.trim();
    let missing = trimmed.len() % 4;
    if missing == 0 {
        STANDARD.decode(trimmed)
    } else {
        let mut padded = trimmed.to_string();
        padded.push_str(&"=".repeat(4 - missing));
        STANDARD.decode(padded)
    }
}

/// Extracts and decodes all `span.JSinfos.base64` elements of a page.
///
/// JSON blobs are parsed and keyed `jsinfos_<title>` when a title is
/// available (from `config.title` or a top-level `title`), with a numeric
/// suffix on collision; non-JSON blobs are kept raw under `jsinfos_raw_<n>`.
pub fn parse_jsinfos(html: &str) -> Map<String, Value> {
    let mut jsinfos = Map::new();
    let document = Html::parse_document(html);

    let Ok(selector) = Selector::parse("span.JSinfos.base64") else {
        return jsinfos;
    };

    for span in document.select(&selector) {
        let text: String = span.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }

        let decoded = match decode_base64_padded(&text) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("base64 decode error in JSinfos span: {e}");
                continue;
            }
        };
        let decoded_str = String::from_utf8_lossy(&decoded).into_owned();
        let trimmed = decoded_str.trim_start();

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match serde_json::from_str::<Value>(&decoded_str) {
                Ok(mut parsed) => {
                    mask_gm_key(&mut parsed);
                    let key = blob_key(&parsed, &jsinfos);
                    jsinfos.insert(key, parsed);
                }
                Err(_) => {
                    let key = format!("jsinfos_raw_{}", jsinfos.len());
                    jsinfos.insert(key, Value::String(decoded_str));
                }
            }
        } else {
            let key = format!("jsinfos_raw_{}", jsinfos.len());
            jsinfos.insert(key, Value::String(decoded_str));
        }
    }

    jsinfos
}

/// Masks `gmKey` at the top level and inside a `config` object.
fn mask_gm_key(value: &mut Value) {
    if let Value::Object(map) = value {
        if map.contains_key("gmKey") {
            map.insert("gmKey".to_string(), Value::String(JSINFOS_MASK.to_string()));
        }
        if let Some(Value::Object(config)) = map.get_mut("config") {
            if config.contains_key("gmKey") {
                config.insert("gmKey".to_string(), Value::String(JSINFOS_MASK.to_string()));
            }
        }
    }
}

/// Title-seeded dictionary key with numeric-suffix disambiguation.
fn blob_key(parsed: &Value, existing: &Map<String, Value>) -> String {
    let title = parsed
        .get("config")
        .and_then(|c| c.get("title"))
        .or_else(|| parsed.get("title"))
        .and_then(Value::as_str);

    let key = match title {
        Some(title) => format!("jsinfos_{title}"),
        None => format!("jsinfos_{}", existing.len()),
    };

    if existing.contains_key(&key) {
        format!("{key}_{}", existing.len())
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(content: &str) -> String {
        STANDARD.encode(content)
    }

    fn span_html(payload: &str) -> String {
        format!(r#"<html><body><span class="JSinfos base64">{payload}</span></body></html>"#)
    }

    #[test]
    fn test_decode_repads_short_input() {
        // "Man" encodes to "TWFu"; strip padding variants still decode.
        assert_eq!(decode_base64_padded("TWFu").unwrap(), b"Man");
        assert_eq!(decode_base64_padded("TWE").unwrap(), b"Ma");
        assert_eq!(decode_base64_padded("TQ").unwrap(), b"M");
    }

    #[test]
    fn test_parse_json_blob_with_title() {
        let payload = encode(&json!({"config": {"title": "Carte"}, "data": [1, 2]}).to_string());
        let jsinfos = parse_jsinfos(&span_html(&payload));
        assert!(jsinfos.contains_key("jsinfos_Carte"));
    }

    #[test]
    fn test_gm_key_masked() {
        let payload =
            encode(&json!({"gmKey": "secret", "config": {"gmKey": "secret2"}}).to_string());
        let jsinfos = parse_jsinfos(&span_html(&payload));
        let blob = jsinfos.values().next().unwrap();
        assert_eq!(blob["gmKey"], JSINFOS_MASK);
        assert_eq!(blob["config"]["gmKey"], JSINFOS_MASK);
    }

    #[test]
    fn test_title_collision_gets_suffix() {
        let payload = encode(&json!({"title": "Dup"}).to_string());
        let html = format!(
            r#"<html><body>
            <span class="JSinfos base64">{payload}</span>
            <span class="JSinfos base64">{payload}</span>
            </body></html>"#
        );
        let jsinfos = parse_jsinfos(&html);
        assert_eq!(jsinfos.len(), 2);
        assert!(jsinfos.contains_key("jsinfos_Dup"));
        assert!(jsinfos.contains_key("jsinfos_Dup_1"));
    }

    #[test]
    fn test_non_json_kept_raw() {
        let payload = encode("plain text payload");
        let jsinfos = parse_jsinfos(&span_html(&payload));
        assert_eq!(jsinfos["jsinfos_raw_0"], "plain text payload");
    }

    #[test]
    fn test_invalid_base64_skipped() {
        let jsinfos = parse_jsinfos(&span_html("!!!not-base64!!!"));
        assert!(jsinfos.is_empty());
    }

    #[test]
    fn test_plain_spans_ignored() {
        let html = r#"<span class="JSinfos">{"nr": 1}</span>"#;
        assert!(parse_jsinfos(html).is_empty());
    }
}
