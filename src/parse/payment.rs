//! Payment extraction: JSinfos tables and detail modals
//!
//! The payment page embeds its tables as JSON inside `JSinfos` spans, mixed
//! with navigation blobs encoded the same way. Real tables are recognized by
//! the key signature of their first data row, then classified as payment
//! requests or transactions by disjoint key sets. Items with a numeric id
//! get one extra detail-modal fetch whose HTML is a flat `label + value`
//! structure merged back onto the item.

use crate::parse::text::{extract_currency, extract_numeric, find_date_iso};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Keys marking a JSON blob's rows as tabular data rather than navigation
const TABLE_ROW_KEYS: &[&str] = &[
    "nr",
    "ordernr",
    "mandatnr",
    "paymentid",
    "transactionnr",
    "tocollect",
    "requestsent",
    "bref",
    "state",
    "paymentmethodnr",
    "date",
    "amount",
    "num",
    "billnr",
];

/// Any of these marks a payment-request table
const PAYMENT_REQUEST_KEYS: &[&str] = &[
    "mandatnr",
    "paymentid",
    "transactionnr",
    "tocollect",
    "requestsent",
    "bref",
    "state",
];

/// All of these together mark a transaction table
const TRANSACTION_KEYS: &[&str] = &["paymentmethodnr", "date", "amount", "num"];

/// Canonical subset kept at the front of each payment-request item
const PAYMENT_REQUEST_CANONICAL: &[&str] = &[
    "nr",
    "ordernr",
    "bref",
    "amount",
    "state",
    "paymentid",
    "transactionnr",
];

/// Canonical subset kept at the front of each transaction item
const TRANSACTION_CANONICAL: &[&str] = &[
    "nr",
    "ordernr",
    "billnr",
    "amount",
    "date",
    "num",
    "paymentmethodnr",
];

/// Modal label fragments for payment-request structured fields
const PAYMENT_REQUEST_FIELD_MAP: &[(&str, &[&str])] = &[
    ("proprietaire", &["proprietaire", "propriétaire", "owner"]),
    ("reference_vente", &["reference vente", "référence vente", "ref vente"]),
    ("reference_facture", &["reference facture", "référence facture", "ref facture", "invoice"]),
    ("description", &["description", "desc"]),
    ("montant_demande", &["montant demande", "montant", "amount", "demande"]),
    ("montant_rembourse", &["montant remboursé", "remboursé", "refund"]),
    ("date_creation", &["date création", "date creation", "créé", "created"]),
    ("date_envoi", &["date envoi", "envoyé", "sent"]),
    ("date_prevue", &["date prévue", "date prevue", "prévu", "scheduled"]),
    ("date_realisation", &["date réalisation", "date realisation", "réalisé", "executed"]),
    ("etat_mandat_prelevement", &["état mandat", "état prélèvement", "mandat", "state"]),
    ("reference_mandat", &["référence mandat", "ref mandat", "mandate"]),
    ("etat_demande_prelevement", &["état demande", "état", "status"]),
    ("reference_prelevement", &["référence prélèvement", "ref prélèvement", "debit"]),
];

/// Modal label fragments for transaction structured fields
const TRANSACTION_FIELD_MAP: &[(&str, &[&str])] = &[
    ("type", &["type de paiement", "type paiement", "type"]),
    ("method", &["méthode de paiement", "methode paiement", "méthode", "methode"]),
    ("date", &["date"]),
    ("amount", &["montant", "amount"]),
    (
        "transaction_id",
        &[
            "numéro transaction",
            "numero transaction",
            "transaction id",
            "id transaction",
            "identifiant",
            "référence transaction",
            "ref transaction",
        ],
    ),
    (
        "invoice_ref",
        &[
            "facture liée",
            "facture liee",
            "facture",
            "invoice",
            "référence facture",
            "ref facture",
        ],
    ),
];

fn invoice_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(FA|INV|FACT)[\s\-]?(\d+)").expect("static invoice pattern"))
}

/// Tables extracted from the payment page's JSinfos spans
#[derive(Debug, Default)]
pub struct PaymentTables {
    pub payment_requests: Vec<Map<String, Value>>,
    pub transactions: Vec<Map<String, Value>>,
    /// Extraction counters, persisted only in dev mode
    pub debug: Map<String, Value>,
}

/// Extracts payment requests and transactions from JSinfos spans.
///
/// Only spans whose JSON carries a `data` array of table-shaped rows are
/// considered; navigation blobs embedded the same way are skipped.
pub fn extract_payment_tables(html: &str) -> PaymentTables {
    let mut result = PaymentTables::default();
    let document = Html::parse_document(html);

    let Ok(selector) = Selector::parse(r#"span[class*="JSinfos"]"#) else {
        return result;
    };

    let mut spans_total = 0usize;
    let mut parsed_ok = 0usize;
    let mut parsed_fail = 0usize;
    let mut tables_found = 0usize;

    let mut table_objects: Vec<Map<String, Value>> = Vec::new();
    for span in document.select(&selector) {
        let text = span.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }
        spans_total += 1;

        let parsed: Map<String, Value> = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => {
                parsed_ok += 1;
                map
            }
            Ok(_) => {
                parsed_fail += 1;
                continue;
            }
            Err(e) => {
                parsed_fail += 1;
                tracing::debug!("failed to parse JSinfos span: {}", &e.to_string());
                continue;
            }
        };

        let Some(rows) = parsed.get("data").and_then(Value::as_array) else {
            continue;
        };
        let Some(Value::Object(first_row)) = rows.first() else {
            continue;
        };
        if TABLE_ROW_KEYS.iter().any(|key| first_row.contains_key(*key)) {
            tables_found += 1;
            table_objects.push(parsed);
        }
    }

    for table in &table_objects {
        let Some(rows) = table.get("data").and_then(Value::as_array) else {
            continue;
        };
        let Some(Value::Object(first_row)) = rows.first() else {
            continue;
        };

        let is_payment_request = PAYMENT_REQUEST_KEYS
            .iter()
            .any(|key| first_row.contains_key(*key));
        let is_transaction = TRANSACTION_KEYS
            .iter()
            .all(|key| first_row.contains_key(*key));

        if is_payment_request && !is_transaction {
            for row in rows {
                if let Value::Object(item) = row {
                    if item.contains_key("nr") {
                        result
                            .payment_requests
                            .push(canonicalize(item, PAYMENT_REQUEST_CANONICAL));
                    }
                }
            }
        } else if is_transaction {
            for row in rows {
                if let Value::Object(item) = row {
                    if item.contains_key("nr") {
                        result
                            .transactions
                            .push(canonicalize(item, TRANSACTION_CANONICAL));
                    }
                }
            }
        }
    }

    tracing::debug!(
        spans_total,
        parsed_ok,
        parsed_fail,
        tables_found,
        payment_requests = result.payment_requests.len(),
        transactions = result.transactions.len(),
        "payment JSinfos extraction"
    );

    result.debug.insert("jsinfos_spans_total".into(), spans_total.into());
    result.debug.insert("parsed_ok".into(), parsed_ok.into());
    result.debug.insert("parsed_fail".into(), parsed_fail.into());
    result.debug.insert("tables_found".into(), tables_found.into());
    result
        .debug
        .insert("payment_requests_found".into(), result.payment_requests.len().into());
    result
        .debug
        .insert("transactions_found".into(), result.transactions.len().into());

    result
}

/// Puts the canonical subset first (missing keys become null), then carries
/// every remaining source field unchanged.
fn canonicalize(item: &Map<String, Value>, canonical: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    for key in canonical {
        out.insert(
            key.to_string(),
            item.get(*key).cloned().unwrap_or(Value::Null),
        );
    }
    for (key, value) in item {
        if !out.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// The numeric id of an item, when present.
pub fn item_nr(item: &Map<String, Value>) -> Option<u64> {
    match item.get("nr") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Flat `label -> value` map from a modal's `fieldset > article` structure.
///
/// Links inside a value div additionally produce `<label>_url` and
/// `<label>_link` entries.
fn parse_modal_fields(document: &Html) -> Map<String, Value> {
    let mut raw_fields = Map::new();

    let selectors = ["section fieldset article", "fieldset article"];
    for selector in selectors {
        let Ok(article_sel) = Selector::parse(selector) else {
            continue;
        };
        let (Ok(label_sel), Ok(div_sel), Ok(link_sel)) = (
            Selector::parse("label"),
            Selector::parse("div"),
            Selector::parse("a[href]"),
        ) else {
            continue;
        };

        for article in document.select(&article_sel) {
            let Some(label) = article.select(&label_sel).next() else {
                continue;
            };
            let Some(div) = article.select(&div_sel).next() else {
                continue;
            };
            let label_text = label.text().collect::<String>().trim().to_string();
            let value_text = div.text().collect::<String>().trim().to_string();
            if label_text.is_empty() || raw_fields.contains_key(&label_text) {
                continue;
            }
            raw_fields.insert(label_text.clone(), Value::String(value_text));

            if let Some(link) = div.select(&link_sel).next() {
                if let Some(href) = link.value().attr("href") {
                    let link_text = link.text().collect::<String>().trim().to_string();
                    raw_fields.insert(format!("{label_text}_url"), Value::String(href.to_string()));
                    raw_fields.insert(format!("{label_text}_link"), Value::String(link_text));
                }
            }
        }
    }

    raw_fields
}

/// First raw field whose key contains any of the fragments (case-insensitive).
fn find_field<'a>(
    raw_fields: &'a Map<String, Value>,
    fragments: &[&str],
) -> Option<(&'a String, &'a Value)> {
    for fragment in fragments {
        let fragment = fragment.to_lowercase();
        for (key, value) in raw_fields {
            if key.to_lowercase().contains(&fragment) {
                return Some((key, value));
            }
        }
    }
    None
}

/// Parses a payment-request detail modal into structured fields plus the
/// raw label map.
pub fn parse_payment_request_modal(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let raw_fields = parse_modal_fields(&document);

    let mut details = Map::new();
    for (schema_key, fragments) in PAYMENT_REQUEST_FIELD_MAP {
        if let Some((_, value)) = find_field(&raw_fields, fragments) {
            if schema_key.starts_with("montant") {
                if let Some(numeric) = value.as_str().and_then(extract_numeric) {
                    details.insert(schema_key.to_string(), numeric.into());
                    continue;
                }
            }
            details.insert(schema_key.to_string(), value.clone());
        }
    }

    let mut result = Map::new();
    result.insert("details".to_string(), Value::Object(details));
    result.insert("raw_fields".to_string(), Value::Object(raw_fields));
    result
}

/// Parses a transaction detail modal into structured fields plus the raw
/// label map. Amounts are split into numeric value and currency; dates are
/// normalized to ISO form when recognizable.
pub fn parse_transaction_modal(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let raw_fields = parse_modal_fields(&document);

    let mut result = Map::new();
    for (schema_key, fragments) in TRANSACTION_FIELD_MAP {
        if let Some((_, value)) = find_field(&raw_fields, fragments) {
            if *schema_key == "invoice_ref" {
                if let Some(text) = value.as_str() {
                    if let Some(caps) = invoice_re().captures(text) {
                        result.insert(
                            schema_key.to_string(),
                            Value::String(format!("{}-{}", &caps[1], &caps[2])),
                        );
                        continue;
                    }
                }
            }
            result.insert(schema_key.to_string(), value.clone());
        }
    }

    // Normalize "210,00 €" into amount 210.0 plus currency EUR.
    let currency = result
        .get("amount")
        .and_then(Value::as_str)
        .and_then(extract_currency)
        .unwrap_or_else(|| "EUR".to_string());
    if let Some(amount_str) = result.get("amount").and_then(Value::as_str) {
        if let Some(numeric) = extract_numeric(amount_str) {
            result.insert("amount".to_string(), numeric.into());
        }
    }
    result.insert("currency".to_string(), Value::String(currency));

    // Bank account: keep label and href separately.
    for (key, value) in &raw_fields {
        let lower = key.to_lowercase();
        if lower.contains("compte") && lower.contains("bancaire") && !lower.ends_with("_url") {
            if let Some(label) = value.as_str() {
                result.insert(
                    "bank_account_label".to_string(),
                    Value::String(label.to_string()),
                );
            }
            if let Some(href) = raw_fields.get(&format!("{key}_url")).and_then(Value::as_str) {
                result.insert(
                    "bank_account_href".to_string(),
                    Value::String(href.to_string()),
                );
            }
            break;
        }
    }

    if let Some(date_str) = result.get("date").and_then(Value::as_str) {
        if let Some(iso) = find_date_iso(date_str) {
            result.insert("date".to_string(), Value::String(iso));
        }
    }

    result.insert("raw_fields".to_string(), Value::Object(raw_fields));
    result
}
