//! Extractors for the main view page
//!
//! The view page carries the basket, the vehicle-rental block and the sale
//! header. Each sub-extraction is independent: a missing block yields a
//! missing field, never a failed record.

use crate::parse::basket::extract_basket_lines;
use crate::parse::text::{extract_numeric, parse_date};
use crate::parse::{select_first_text, select_numeric};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

fn nr_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"nr=(\d+)").expect("static nr pattern"))
}

fn plate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([A-Z0-9\-]+)\)").expect("static plate pattern"))
}

fn vehicle_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z][A-Z\s]+\([A-Z0-9\-]+\))").expect("static label pattern"))
}

fn week_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:semaine|week)[\s:]+([0-9]{4}-[0-9]{1,2})").expect("static week pattern")
    })
}

fn type_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)type\s+de\s+vente[:\s]+([A-Za-z_]+)").expect("static type pattern")
    })
}

/// Full view-page extraction: basket, vehicle-rental block, sale header,
/// plus any embedded JSinfos blobs.
pub fn extract_view_data(html: &str) -> Map<String, Value> {
    let mut extracted = Map::new();
    extracted.insert("basket".to_string(), extract_basket_data(html));
    extracted.insert(
        "location".to_string(),
        Value::Object(extract_location_vehicule(html)),
    );
    extracted.insert(
        "sale_header".to_string(),
        Value::Object(extract_sale_header(html)),
    );
    let blobs = crate::parse::jsinfos::parse_jsinfos(html);
    if !blobs.is_empty() {
        extracted.insert("jsinfos".to_string(), Value::Object(blobs));
    }
    extracted
}

/// Basket lines and totals.
pub fn extract_basket_data(html: &str) -> Value {
    let lines = extract_basket_lines(html);
    let totals = extract_basket_totals(html, &lines);
    json!({
        "basket_lines": lines,
        "basket_totals": totals,
    })
}

fn extract_basket_totals(html: &str, lines: &[Map<String, Value>]) -> Value {
    let document = Html::parse_document(html);
    let mut totals = Map::new();

    let mut total_ht = select_numeric(
        &document,
        &[".total-ht", "[class*='total-ht']", "[class*='total_ht']"],
    );
    let total_ttc = select_numeric(
        &document,
        &[".total-ttc", "[class*='total-ttc']", "[class*='total_ttc']"],
    );
    let total_tax = select_numeric(
        &document,
        &[".total-tva", "[class*='total-tva']", "[class*='total_tva']"],
    );

    // Fall back to summing the lines when the page shows no total.
    if total_ht.is_none() && !lines.is_empty() {
        let sum: f64 = lines
            .iter()
            .map(|line| {
                let price = line.get("price").and_then(value_as_f64).unwrap_or(0.0);
                let qtty = line.get("qtty").and_then(value_as_f64).unwrap_or(0.0);
                price * qtty
            })
            .sum();
        if sum > 0.0 {
            total_ht = Some(sum);
        }
    }

    if let Some(v) = total_ht {
        totals.insert("total_ht".to_string(), json!(v));
    }
    if let Some(v) = total_ttc {
        totals.insert("total_ttc".to_string(), json!(v));
    }
    if let Some(v) = total_tax {
        totals.insert("total_tax".to_string(), json!(v));
    }

    let currency = select_first_text(
        &document,
        &[".currency", "[class*='currency']", "[class*='devise']"],
    )
    .unwrap_or_else(|| "EUR".to_string());
    totals.insert("currency".to_string(), Value::String(currency));

    Value::Object(totals)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => extract_numeric(s),
        _ => None,
    }
}

/// Vehicle-rental block: label, vehicle nr, plate, week, and the two
/// cross-referenced sale nrs behind the labeled action buttons.
pub fn extract_location_vehicule(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let mut location = Map::new();

    // Vehicle label from the text around the rental heading.
    if let Ok(h5_sel) = Selector::parse("h5") {
        for h5 in document.select(&h5_sel) {
            let heading = h5.text().collect::<String>().to_lowercase();
            if heading.contains("location") && heading.contains("véhicule") {
                if let Some(parent) = h5.parent().and_then(ElementRef::wrap) {
                    let context = parent.text().collect::<Vec<_>>().join(" ");
                    if let Some(caps) = vehicle_label_re().captures(&context) {
                        location.insert(
                            "vehicle_label".to_string(),
                            Value::String(caps[1].trim().to_string()),
                        );
                    }
                }
                break;
            }
        }
    }

    // Vehicle link carries the numeric id; its text is the better label.
    if let Ok(link_sel) = Selector::parse(r#"a[href*="vehicles/view"]"#) {
        if let Some(link) = document.select(&link_sel).next() {
            if let Some(href) = link.value().attr("href") {
                if let Some(caps) = nr_param_re().captures(href) {
                    if let Ok(nr) = caps[1].parse::<u64>() {
                        location.insert("vehicle_nr".to_string(), json!(nr));
                    }
                }
            }
            let text = link.text().collect::<String>().trim().to_string();
            if !text.is_empty() && !location.contains_key("vehicle_label") {
                location.insert("vehicle_label".to_string(), Value::String(text));
            }
        }
    }

    if let Some(Value::String(label)) = location.get("vehicle_label") {
        if let Some(caps) = plate_re().captures(label) {
            location.insert("plate".to_string(), Value::String(caps[1].to_string()));
        }
    }

    let semaine = select_first_text(
        &document,
        &[".semaine", "[class*='semaine']", "[class*='week']", "[data-semaine]"],
    )
    .or_else(|| {
        let body = document.root_element().text().collect::<Vec<_>>().join(" ");
        week_re().captures(&body).map(|caps| caps[1].to_string())
    });
    if let Some(semaine) = semaine {
        location.insert("semaine".to_string(), Value::String(semaine.trim().to_string()));
    }

    if let Some(nr) = labeled_link_nr(&document, &["contrat", "caution"]) {
        location.insert("contract_cto_nr".to_string(), json!(nr));
    }
    if let Some(nr) = labeled_link_nr(&document, &["derni", "abonnement"]) {
        location.insert("last_subscription_cto_nr".to_string(), json!(nr));
    }

    location
}

/// First `nr=` link whose text contains all the given fragments.
fn labeled_link_nr(document: &Html, fragments: &[&str]) -> Option<u64> {
    let link_sel = Selector::parse(r#"a[href*="nr="]"#).ok()?;
    for link in document.select(&link_sel) {
        let text = link.text().collect::<String>().to_lowercase();
        if fragments.iter().all(|f| text.contains(f)) {
            let href = link.value().attr("href")?;
            if let Some(caps) = nr_param_re().captures(href) {
                return caps[1].parse().ok();
            }
        }
    }
    None
}

/// Sale header: type code, status, creation date, linked contact and biz.
pub fn extract_sale_header(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let mut header = Map::new();

    let type_code = select_first_text(
        &document,
        &["[data-type-code]", ".type-code", "[class*='type-code']"],
    )
    .or_else(|| {
        let body = document.root_element().text().collect::<Vec<_>>().join(" ");
        type_code_re().captures(&body).map(|caps| caps[1].to_string())
    });
    if let Some(type_code) = type_code {
        header.insert("type_code".to_string(), Value::String(type_code.trim().to_string()));
    }

    if let Some(status) = select_first_text(&document, &["[data-status]", ".status", "[class*='status']"])
    {
        header.insert("status".to_string(), Value::String(status));
    }

    if let Some(created) = select_first_text(
        &document,
        &[
            "[data-created-at]",
            ".created-at",
            "[class*='created-at']",
            "[class*='date-creation']",
        ],
    ) {
        if let Some(date) = parse_date(&created) {
            header.insert("created_at".to_string(), Value::String(date));
        }
    }

    if let Some(nr) = first_link_nr(&document, &[r#"a[href*="ct/view"]"#, r#"a[href*="crm/ct"]"#]) {
        header.insert("contact_nr".to_string(), json!(nr));
    }
    if let Some(nr) = first_link_nr(&document, &[r#"a[href*="biz/view"]"#, r#"a[href*="com/biz"]"#]) {
        header.insert("biz_nr".to_string(), json!(nr));
    }

    header
}

fn first_link_nr(document: &Html, selectors: &[&str]) -> Option<u64> {
    for selector in selectors {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for link in document.select(&sel) {
            if let Some(href) = link.value().attr("href") {
                if let Some(caps) = nr_param_re().captures(href) {
                    if let Ok(nr) = caps[1].parse() {
                        return Some(nr);
                    }
                }
            }
        }
    }
    None
}
