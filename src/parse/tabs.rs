//! Extractors for the logistic, payment, infos and orders tabs

use crate::parse::jsinfos::parse_jsinfos;
use crate::parse::payment::extract_payment_tables;
use crate::parse::text::extract_numeric;
use crate::parse::{select_first_text, select_numeric};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Keywords marking an anchor as a shipping document link
const DOCUMENT_KEYWORDS: &[&str] = &[
    ".pdf",
    "document",
    "bon-livraison",
    "tracking",
    "suivi",
    "expedition",
];

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("static template pattern"))
}

fn template_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(totaltax|totalprice|shippingprice)").expect("static template var pattern")
    })
}

fn script_var_patterns() -> &'static [(Regex, &'static str)] {
    static RES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            (r"(?i)(?:var|let|const)\s+(?:totaltax|total_tax)\s*=\s*([\d.]+)", "totaltax"),
            (r"(?i)(?:var|let|const)\s+(?:totalprice|total_price)\s*=\s*([\d.]+)", "totalprice"),
            (
                r"(?i)(?:var|let|const)\s+(?:shippingprice|shipping_price|port)\s*=\s*([\d.]+)",
                "shippingprice",
            ),
            (r#"(?i)"totaltax"\s*:\s*([\d.]+)"#, "totaltax"),
            (r#"(?i)"totalprice"\s*:\s*([\d.]+)"#, "totalprice"),
            (r#"(?i)"shippingprice"\s*:\s*([\d.]+)"#, "shippingprice"),
            (r#"(?i)data-total-tax\s*=\s*['"]([\d.]+)['"]"#, "totaltax"),
            (r#"(?i)data-total-price\s*=\s*['"]([\d.]+)['"]"#, "totalprice"),
            (r#"(?i)data-shipping-price\s*=\s*['"]([\d.]+)['"]"#, "shippingprice"),
        ]
        .iter()
        .map(|(pattern, key)| (Regex::new(pattern).expect("static script var pattern"), *key))
        .collect()
    })
}

/// Payment tab: JSinfos tables, invoices, optional summary.
pub fn extract_payment_page(html: &str) -> Map<String, Value> {
    let mut extracted = Map::new();

    let tables = extract_payment_tables(html);
    if !tables.payment_requests.is_empty() {
        extracted.insert(
            "payment_requests".to_string(),
            Value::Array(tables.payment_requests.into_iter().map(Value::Object).collect()),
        );
    }
    if !tables.transactions.is_empty() {
        extracted.insert(
            "transactions".to_string(),
            Value::Array(tables.transactions.into_iter().map(Value::Object).collect()),
        );
    }

    let document = Html::parse_document(html);
    let invoices = extract_list_items(&document, &["invoice", "facture"]);
    if !invoices.is_empty() {
        extracted.insert("invoices".to_string(), Value::Array(invoices));
    }

    let mut summary = Map::new();
    if let Some(status) = select_first_text(
        &document,
        &[".payment-status", "[class*='payment-status']", "[data-status]"],
    ) {
        summary.insert("status".to_string(), Value::String(status));
    }
    for (key, selectors) in [
        ("total_due", [".total-due", "[class*='total-due']", "[data-total-due]"]),
        ("total_paid", [".total-paid", "[class*='total-paid']", "[data-total-paid]"]),
        ("balance", [".balance", "[class*='balance']", "[data-balance]"]),
    ] {
        if let Some(value) = select_numeric(&document, &selectors) {
            summary.insert(key.to_string(), value.into());
        }
    }
    if !summary.is_empty() {
        extracted.insert("payment_summary".to_string(), Value::Object(summary));
    }

    attach_jsinfos(&mut extracted, html);
    extracted
}

/// Logistic tab: delivery summary plus classified document links.
pub fn extract_logistic_data(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let mut extracted = Map::new();

    let mut summary = Map::new();
    if let Some(method) = select_first_text(
        &document,
        &[
            ".delivery-method",
            "[class*='delivery-method']",
            "[data-delivery]",
            ".methode-livraison",
            "[class*='livraison']",
        ],
    ) {
        summary.insert("delivery_method".to_string(), Value::String(method));
    }
    if let Some(status) = select_first_text(
        &document,
        &[
            ".shipping-status",
            "[class*='shipping-status']",
            "[data-shipping-status]",
            ".statut-livraison",
            "[class*='statut']",
        ],
    ) {
        summary.insert("shipping_status".to_string(), Value::String(status));
    }
    if let Some(tracking) = select_first_text(
        &document,
        &[".tracking", "[class*='tracking']", "[data-tracking]", ".numero-suivi"],
    ) {
        summary.insert("tracking_number".to_string(), Value::String(tracking));
    }
    // The summary object is always present, even when empty.
    extracted.insert("logistic_summary".to_string(), Value::Object(summary));

    let mut documents = Vec::new();
    if let Ok(link_sel) = Selector::parse("a[href]") {
        for link in document.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("").to_string();
            let text = link.text().collect::<String>().trim().to_string();
            let href_lower = href.to_lowercase();
            let text_lower = text.to_lowercase();
            if DOCUMENT_KEYWORDS
                .iter()
                .any(|kw| href_lower.contains(kw) || text_lower.contains(kw))
            {
                let label = if text.is_empty() { href.clone() } else { text.clone() };
                let mut doc = Map::new();
                doc.insert("url".to_string(), Value::String(href.clone()));
                doc.insert("label".to_string(), Value::String(label));
                doc.insert(
                    "type".to_string(),
                    Value::String(classify_document_link(&href_lower, &text_lower)),
                );
                documents.push(Value::Object(doc));
            }
        }
    }
    if !documents.is_empty() {
        extracted.insert("documents".to_string(), Value::Array(documents));
    }

    attach_jsinfos(&mut extracted, html);
    extracted
}

fn classify_document_link(href: &str, text: &str) -> String {
    let combined = format!("{href} {text}");
    if combined.contains("bon-livraison") || combined.contains("bl-") {
        "bl".to_string()
    } else if combined.contains("tracking") || combined.contains("suivi") {
        "tracking".to_string()
    } else if combined.contains(".pdf") {
        "pdf".to_string()
    } else {
        "document".to_string()
    }
}

/// Infos tab: key/value pairs with template-expression resolution.
pub fn extract_infos_data(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let mut extracted = Map::new();

    let resolved_values = extract_script_values(html);

    let mut fields = Map::new();
    if let (Ok(dl_sel), Ok(dt_sel), Ok(dd_sel)) = (
        Selector::parse("dl"),
        Selector::parse("dt"),
        Selector::parse("dd"),
    ) {
        for dl in document.select(&dl_sel) {
            let keys: Vec<String> = dl
                .select(&dt_sel)
                .map(|dt| dt.text().collect::<String>().trim().to_string())
                .collect();
            let values: Vec<String> = dl
                .select(&dd_sel)
                .map(|dd| dd.text().collect::<String>().trim().to_string())
                .collect();
            for (key, value) in keys.into_iter().zip(values) {
                if !key.is_empty() && !value.is_empty() {
                    fields.insert(key, resolve_template_value(&value, &resolved_values));
                }
            }
        }
    }

    if let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td, th"),
    ) {
        for table in document.select(&table_sel) {
            for row in table.select(&row_sel) {
                let cells: Vec<String> = row
                    .select(&cell_sel)
                    .map(|c| c.text().collect::<String>().trim().to_string())
                    .collect();
                if cells.len() >= 2 && !cells[0].is_empty() && !cells[1].is_empty() {
                    fields.insert(
                        cells[0].clone(),
                        resolve_template_value(&cells[1], &resolved_values),
                    );
                }
            }
        }
    }

    if !fields.is_empty() {
        extracted.insert("infos_fields".to_string(), Value::Object(fields));
    }

    let template_vars = extract_template_variables(html);
    if !template_vars.is_empty() {
        extracted.insert("template_variables".to_string(), Value::Object(template_vars));
    }

    attach_jsinfos(&mut extracted, html);
    extracted
}

/// Numeric values published by inline scripts, JSON blobs or data
/// attributes, keyed by canonical variable name. First match wins per key.
fn extract_script_values(html: &str) -> Map<String, Value> {
    let mut values = Map::new();
    for (re, key) in script_var_patterns() {
        if values.contains_key(*key) {
            continue;
        }
        if let Some(caps) = re.captures(html) {
            if let Ok(value) = caps[1].parse::<f64>() {
                values.insert(key.to_string(), value.into());
            }
        }
    }
    values
}

/// Resolves `{{...}}` template expressions against scraped script values.
///
/// An expression referencing a known variable becomes that variable's
/// number; anything else stays the literal placeholder text. Plain values
/// that are entirely numeric are converted.
fn resolve_template_value(value: &str, resolved: &Map<String, Value>) -> Value {
    if let Some(caps) = template_re().captures(value) {
        let expr = caps[1].trim().to_string();
        if let Some(var_caps) = template_var_re().captures(&expr) {
            let name = var_caps[1].to_lowercase();
            if let Some(known) = resolved.get(&name) {
                return known.clone();
            }
        }
        return Value::String(value.to_string());
    }

    let cleaned = value.replace([' ', '\u{a0}'], "").replace(',', ".");
    if let Ok(number) = cleaned.parse::<f64>() {
        return number.into();
    }
    Value::String(value.to_string())
}

/// Template variable names used on the page, with a sample expression each.
fn extract_template_variables(html: &str) -> Map<String, Value> {
    let mut variables = Map::new();
    for caps in template_re().captures_iter(html) {
        let expr = caps[1].trim().to_string();
        for var_caps in template_var_re().captures_iter(&expr) {
            let name = var_caps[1].to_lowercase();
            variables
                .entry(name)
                .or_insert_with(|| Value::String(expr.clone()));
        }
    }
    variables
}

/// Orders tab: purchase lines via two fallback strategies, plus totals.
pub fn extract_orders_data(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let mut extracted = Map::new();

    let mut summary = Map::new();
    if let Some(total) = select_numeric(
        &document,
        &[".total-orders", "[class*='total-orders']", "[data-total-orders]"],
    ) {
        summary.insert("total_orders".to_string(), total.into());
    }
    extracted.insert("orders_summary".to_string(), Value::Object(summary));

    let mut purchase_lines = extract_table_lines(&document);
    if purchase_lines.is_empty() {
        purchase_lines = extract_card_lines(&document);
    }
    if !purchase_lines.is_empty() {
        extracted.insert("purchase_lines".to_string(), Value::Array(purchase_lines));
    }

    let mut totals = Map::new();
    if let Some(total) = select_numeric(
        &document,
        &[".total-amount", "[class*='total-amount']", "[data-total]"],
    ) {
        totals.insert("total".to_string(), total.into());
    }
    if let Some(margin) = select_numeric(
        &document,
        &[".margin", "[class*='margin']", "[data-margin]", ".marge"],
    ) {
        totals.insert("margin".to_string(), margin.into());
    }
    if !totals.is_empty() {
        extracted.insert("totals".to_string(), Value::Object(totals));
    }

    attach_jsinfos(&mut extracted, html);
    extracted
}

/// Strategy 1: structured table rows.
fn extract_table_lines(document: &Html) -> Vec<Value> {
    let mut lines = Vec::new();
    let selectors = [
        "tr[data-line]",
        "tr[data-product]",
        ".purchase-line",
        "[class*='purchase-line']",
        "[class*='order-line']",
    ];
    let Ok(cell_sel) = Selector::parse("td") else {
        return lines;
    };

    for selector in selectors {
        let Ok(row_sel) = Selector::parse(selector) else {
            continue;
        };
        for row in document.select(&row_sel) {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect();
            if cells.len() < 2 {
                continue;
            }
            let mut line = Map::new();
            line.insert("name".to_string(), Value::String(cells[0].clone()));
            if let Some(amount) = extract_numeric(&cells[1]) {
                line.insert("amount".to_string(), amount.into());
            }
            if let Some(qty) = cells.get(2).and_then(|c| extract_numeric(c)) {
                line.insert("quantity".to_string(), qty.into());
            }
            if let Some(date) = cells.get(3).filter(|c| !c.is_empty()) {
                line.insert("date".to_string(), Value::String(date.clone()));
            }
            if line.contains_key("name") || line.contains_key("amount") {
                lines.push(Value::Object(line));
            }
        }
        if !lines.is_empty() {
            break;
        }
    }
    lines
}

/// Strategy 2: list/card items.
fn extract_card_lines(document: &Html) -> Vec<Value> {
    let mut lines = Vec::new();
    let selectors = ["li[data-product]", ".order-item", "[class*='order-item']"];
    let parts = [
        ("name", ".name, .product-name"),
        ("amount", ".amount, .price"),
        ("quantity", ".quantity, .qty"),
        ("date", ".date"),
    ];

    for selector in selectors {
        let Ok(item_sel) = Selector::parse(selector) else {
            continue;
        };
        for item in document.select(&item_sel) {
            let mut line = Map::new();
            for (key, part_selector) in parts {
                let Ok(part_sel) = Selector::parse(part_selector) else {
                    continue;
                };
                if let Some(node) = item.select(&part_sel).next() {
                    let text = node.text().collect::<String>().trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    match key {
                        "amount" | "quantity" => {
                            if let Some(value) = extract_numeric(&text) {
                                line.insert(key.to_string(), value.into());
                            }
                        }
                        _ => {
                            line.insert(key.to_string(), Value::String(text));
                        }
                    }
                }
            }
            if line.contains_key("name") || line.contains_key("amount") {
                lines.push(Value::Object(line));
            }
        }
        if !lines.is_empty() {
            break;
        }
    }
    lines
}

/// Rows or list items whose text mentions one of the keywords.
fn extract_list_items(document: &Html, keywords: &[&str]) -> Vec<Value> {
    let mut items = Vec::new();
    let (Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("tr, li, .item"),
        Selector::parse("td, .cell"),
    ) else {
        return items;
    };

    for row in document.select(&row_sel) {
        let text = row.text().collect::<String>().trim().to_string();
        let lower = text.to_lowercase();
        if !keywords.iter().any(|kw| lower.contains(kw)) {
            continue;
        }

        let mut item = Map::new();
        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if cells.is_empty() {
            item.insert("label".to_string(), Value::String(text));
        } else {
            item.insert("label".to_string(), Value::String(cells[0].clone()));
            if let Some(amount) = cells.get(1).and_then(|c| extract_numeric(c)) {
                item.insert("amount".to_string(), amount.into());
            }
        }
        if item
            .get("label")
            .and_then(Value::as_str)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
        {
            items.push(Value::Object(item));
        }
    }
    items
}

/// Adds the page's decoded JSinfos blobs when any are present.
fn attach_jsinfos(extracted: &mut Map<String, Value>, html: &str) {
    let blobs = parse_jsinfos(html);
    if !blobs.is_empty() {
        extracted.insert("jsinfos".to_string(), Value::Object(blobs));
    }
}
