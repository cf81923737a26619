//! Secret redaction for persisted and logged payloads
//!
//! This is the single enforcement point for credential hygiene: every
//! payload headed for the sink, the spool, the ledger or an error log goes
//! through [`redact_value`] / [`redact_str`]. The pass runs after all
//! extraction, never before, so partial payloads are not mangled.
//!
//! Both functions are idempotent: redacting redacted output is a no-op.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Keys whose value is replaced outright regardless of type (compared
/// case-insensitively)
const SENSITIVE_KEYS: &[&str] = &[
    "gmkey",
    "gm_key",
    "websocketauthtoken",
    "access_token",
    "refresh_token",
];

/// The fixed mask token
pub const MASK: &str = "[REDACTED]";

fn patterns() -> &'static [(Regex, &'static str)] {
    static RES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            (
                r#"(?i)digiSuiteVars\.websocketAuthToken\s*[:=]\s*["'][^"']+["']"#,
                r#"digiSuiteVars.websocketAuthToken = "[REDACTED]""#,
            ),
            (
                r#"(?i)gmKey["']?\s*[:=]\s*["'][^"']+["']"#,
                r#"gmKey = "[REDACTED]""#,
            ),
            (
                r#"(?i)access_token["']?\s*[:=]\s*["'][^"']+["']"#,
                r#"access_token = "[REDACTED]""#,
            ),
            (
                r#"(?i)refresh_token["']?\s*[:=]\s*["'][^"']+["']"#,
                r#"refresh_token = "[REDACTED]""#,
            ),
            (
                r#"(?i)Authorization["']?\s*[:=]\s*["']Bearer\s+[^"']+["']"#,
                r#"Authorization = "Bearer [REDACTED]""#,
            ),
            (
                r"(?i)DigifactoryBO=[^;,\s]+",
                "DigifactoryBO=[REDACTED]",
            ),
        ]
        .iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("static redact pattern"),
                *replacement,
            )
        })
        .collect()
    })
}

/// Redacts secret assignment patterns inside a string.
///
/// Applied to every string value in persisted structures, including error
/// messages destined for logs or storage.
pub fn redact_str(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in patterns() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Recursively redacts a JSON structure.
///
/// Values under sensitive keys are replaced with the mask token whatever
/// their type; every other string runs through [`redact_str`].
pub fn redact_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .into_iter()
                .map(|(key, val)| {
                    if SENSITIVE_KEYS.contains(&key.to_lowercase().as_str()) {
                        (key, Value::String(MASK.to_string()))
                    } else {
                        (key, redact_value(val))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::String(s) => Value::String(redact_str(&s)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_cookie_in_string() {
        let input = "fetch failed with Cookie: DigifactoryBO=abc123; retrying";
        let output = redact_str(input);
        assert!(output.contains("DigifactoryBO=[REDACTED]"));
        assert!(!output.contains("abc123"));
    }

    #[test]
    fn test_redact_token_assignment() {
        let input = r#"var x = {access_token: "secret-token-value"};"#;
        let output = redact_str(input);
        assert!(!output.contains("secret-token-value"));
        assert!(output.contains(MASK));
    }

    #[test]
    fn test_redact_bearer() {
        let input = r#"Authorization: "Bearer eyJtoken""#;
        let output = redact_str(input);
        assert!(!output.contains("eyJtoken"));
    }

    #[test]
    fn test_redact_str_idempotent() {
        let input = r#"gmKey = "supersecret" and DigifactoryBO=abc"#;
        let once = redact_str(input);
        let twice = redact_str(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sensitive_keys_masked_at_any_depth() {
        let input = json!({
            "nr": 1,
            "config": {"gmKey": "secret", "title": "Carte"},
            "items": [{"access_token": 12345}, {"ok": true}],
        });
        let output = redact_value(input);
        assert_eq!(output["config"]["gmKey"], MASK);
        assert_eq!(output["config"]["title"], "Carte");
        assert_eq!(output["items"][0]["access_token"], MASK);
        assert_eq!(output["nr"], 1);
    }

    #[test]
    fn test_sensitive_key_case_insensitive() {
        let output = redact_value(json!({"GMKEY": "x", "Refresh_Token": "y"}));
        assert_eq!(output["GMKEY"], MASK);
        assert_eq!(output["Refresh_Token"], MASK);
    }

    #[test]
    fn test_redact_value_idempotent() {
        let input = json!({"gmKey": "x", "note": "DigifactoryBO=abc"});
        let once = redact_value(input);
        let twice = redact_value(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_string_scalars_untouched() {
        let output = redact_value(json!({"amount": 210.5, "ok": true, "none": null}));
        assert_eq!(output["amount"], 210.5);
        assert_eq!(output["ok"], true);
        assert!(output["none"].is_null());
    }
}
