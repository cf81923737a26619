//! Explorer link harvesting, normalization and tagging
//!
//! Every page yields the set of links a human operator could reach from it:
//! plain anchors, the site's `jsinfos="url:'...'"` inline micro-syntax, and
//! data attributes. Links are normalized to absolute form, canonicalized,
//! deduplicated and tagged. Links matching the dangerous-action vocabulary
//! (logout, delete) are flagged but kept: the consumer wants visibility
//! without risking invocation.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn jsinfos_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)jsinfos\s*=\s*["']\{?url:\s*'([^']+)'"#).expect("static jsinfos pattern")
    })
}

fn doubled_segment_re() -> &'static [(Regex, &'static str)] {
    static RES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RES.get_or_init(|| {
        [(r"/digi/digi/", "/digi/"), (r"/com/com/", "/com/")]
            .iter()
            .map(|(pattern, replacement)| {
                (Regex::new(pattern).expect("static segment pattern"), *replacement)
            })
            .collect()
    })
}

/// One harvested link with its classification
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExplorerLink {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub noted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<String>>,
}

/// Raw link harvest: anchors, `jsinfos` attributes, data attributes.
/// Returns normalized absolute URLs, deduplicated and sorted.
pub fn extract_explorer_links(html: &str, base_url: &str) -> Vec<String> {
    if html.is_empty() {
        return Vec::new();
    }

    let document = Html::parse_document(html);
    let mut links: HashSet<String> = HashSet::new();

    if let Ok(anchor_sel) = Selector::parse("a[href]") {
        for anchor in document.select(&anchor_sel) {
            if let Some(href) = anchor.value().attr("href") {
                if let Some(normalized) = normalize_url(href, base_url) {
                    links.insert(normalized);
                }
            }
        }
    }

    for caps in jsinfos_url_re().captures_iter(html) {
        if let Some(normalized) = normalize_url(&caps[1], base_url) {
            links.insert(normalized);
        }
    }

    if let Ok(data_sel) = Selector::parse("[data-url], [data-href]") {
        for element in document.select(&data_sel) {
            let target = element
                .value()
                .attr("data-url")
                .or_else(|| element.value().attr("data-href"));
            if let Some(target) = target {
                if let Some(normalized) = normalize_url(target, base_url) {
                    links.insert(normalized);
                }
            }
        }
    }

    let mut sorted: Vec<String> = links.into_iter().collect();
    sorted.sort();
    sorted
}

/// Normalizes a raw href to absolute form against the base URL.
///
/// Fragments-only and `javascript:` targets are dropped. The result is
/// always absolute; normalizing an already-normalized URL is a no-op.
pub fn normalize_url(raw: &str, base_url: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }

    let base = Url::parse(base_url).ok()?;
    if let Some(protocol_relative) = raw.strip_prefix("//") {
        return Some(format!("{}://{}", base.scheme(), protocol_relative));
    }
    base.join(raw).ok().map(|joined| joined.to_string())
}

/// Canonicalizes an absolute URL by collapsing doubled path segments the
/// site's templates occasionally emit. Idempotent.
pub fn canonicalize_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut path = parsed.path().to_string();
    for (re, replacement) in doubled_segment_re() {
        path = re.replace_all(&path, *replacement).into_owned();
    }

    let mut canonical = format!(
        "{}://{}{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or(""),
        match parsed.port() {
            Some(port) => format!(":{port}{path}"),
            None => path,
        }
    );
    if let Some(query) = parsed.query() {
        canonical.push('?');
        canonical.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        canonical.push('#');
        canonical.push_str(fragment);
    }
    Some(canonical)
}

/// Tags a link by URL-keyword heuristics.
pub fn tag_link_type(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.contains("/cto/view") {
        "tab"
    } else if lower.contains("/ct/view") || lower.contains("/crm/ct") {
        "contact"
    } else if lower.contains("/vehicles/view") || lower.contains("/mod-ep/vehicles") {
        "vehicle"
    } else if lower.contains("/biz/view") || lower.contains("/com/biz") {
        "biz"
    } else if [".pdf", ".doc", ".docx", ".xls", ".xlsx"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        "doc"
    } else if is_dangerous_link(url) {
        "dangerous"
    } else {
        "other"
    }
}

/// Whether following the link would trigger a state-changing action.
pub fn is_dangerous_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("logout")
        || lower.contains("quit=1")
        || lower.contains("/del")
        || lower.contains("action=delete")
        || lower.contains("destroy")
        || lower.contains("remove")
}

fn is_heavy_download(url: &str) -> bool {
    let lower = url.to_lowercase();
    [".pdf", ".zip", ".tar", ".gz", ".rar"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn extract_scope(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.contains("/digi/") {
        "digi"
    } else if lower.contains("/com/") {
        "com"
    } else if lower.contains("/crm/") {
        "crm"
    } else if lower.contains("/help/") || lower.contains("/doc/") {
        "help"
    } else {
        "other"
    }
}

/// Full explorer pass: harvest, canonicalize, deduplicate, cap, tag.
pub fn filter_and_tag_explorer_links(
    html: &str,
    base_url: &str,
    max_links: usize,
) -> Vec<ExplorerLink> {
    let raw_links = extract_explorer_links(html, base_url);

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for link in raw_links {
        if let Some(canonical) = canonicalize_url(&link) {
            if seen.insert(canonical.clone()) {
                unique.push(canonical);
            }
        }
    }

    unique
        .into_iter()
        .take(max_links)
        .map(|url| {
            let scope = extract_scope(&url).to_string();
            if is_dangerous_link(&url) {
                return ExplorerLink {
                    url,
                    kind: "dangerous".to_string(),
                    scope,
                    reason: Some("dangerous_action".to_string()),
                    noted: true,
                    notes: None,
                };
            }
            let notes: Vec<String> = if is_heavy_download(&url) {
                vec!["heavy_download".to_string()]
            } else {
                Vec::new()
            };
            ExplorerLink {
                kind: tag_link_type(&url).to_string(),
                scope,
                reason: None,
                noted: !notes.is_empty(),
                notes: if notes.is_empty() { None } else { Some(notes) },
                url,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://bo.example.com";

    #[test]
    fn test_harvest_from_all_sources() {
        let html = r##"<html><body>
            <a href="/digi/com/cto/view?nr=1">Tab</a>
            <div jsinfos="url:'/digi/crm/ct/view?nr=2'">Contact</div>
            <button data-url="/digi/com/biz/view?nr=3">Biz</button>
            <a href="#anchor">Skip</a>
            <a href="javascript:void(0)">Skip</a>
        </body></html>"##;
        let links = extract_explorer_links(html, BASE);
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|l| l.starts_with("https://")));
    }

    #[test]
    fn test_normalize_variants() {
        assert_eq!(
            normalize_url("/page", BASE),
            Some("https://bo.example.com/page".to_string())
        );
        assert_eq!(
            normalize_url("//cdn.example.com/x", BASE),
            Some("https://cdn.example.com/x".to_string())
        );
        assert_eq!(
            normalize_url("https://other.example.com/", BASE),
            Some("https://other.example.com/".to_string())
        );
        assert_eq!(normalize_url("#top", BASE), None);
        assert_eq!(normalize_url("javascript:run()", BASE), None);
    }

    #[test]
    fn test_normalize_then_canonicalize_idempotent() {
        let raw = "/digi/digi/com/com/cto/view?nr=5";
        let normalized = normalize_url(raw, BASE).unwrap();
        let canonical = canonicalize_url(&normalized).unwrap();
        assert_eq!(canonical, "https://bo.example.com/digi/com/cto/view?nr=5");
        // Composing again changes nothing, and the result is absolute.
        let again = canonicalize_url(&normalize_url(&canonical, BASE).unwrap()).unwrap();
        assert_eq!(again, canonical);
        assert!(Url::parse(&canonical).is_ok());
    }

    #[test]
    fn test_tagging() {
        assert_eq!(tag_link_type("https://x/digi/com/cto/viewPayment?nr=1"), "tab");
        assert_eq!(tag_link_type("https://x/digi/crm/ct/view?nr=2"), "contact");
        assert_eq!(tag_link_type("https://x/digi/mod-ep/vehicles/view?nr=3"), "vehicle");
        assert_eq!(tag_link_type("https://x/digi/com/biz/view?nr=4"), "biz");
        assert_eq!(tag_link_type("https://x/files/contract.pdf"), "doc");
        assert_eq!(tag_link_type("https://x/misc"), "other");
    }

    #[test]
    fn test_dangerous_links_flagged_not_dropped() {
        let html = r#"<a href="/digi/com/logout">Déconnexion</a>
                      <a href="/digi/com/cto/view?nr=1">Tab</a>"#;
        let links = filter_and_tag_explorer_links(html, BASE, 200);
        assert_eq!(links.len(), 2);
        let dangerous: Vec<_> = links.iter().filter(|l| l.kind == "dangerous").collect();
        assert_eq!(dangerous.len(), 1);
        assert_eq!(dangerous[0].reason.as_deref(), Some("dangerous_action"));
        assert!(dangerous[0].noted);
    }

    #[test]
    fn test_heavy_download_noted() {
        let html = r#"<a href="/docs/export.zip">Export</a>"#;
        let links = filter_and_tag_explorer_links(html, BASE, 200);
        assert_eq!(links[0].notes.as_deref(), Some(&["heavy_download".to_string()][..]));
        assert!(links[0].noted);
    }

    #[test]
    fn test_max_links_cap() {
        let html: String = (0..50)
            .map(|i| format!(r#"<a href="/digi/com/cto/view?nr={i}">x</a>"#))
            .collect();
        let links = filter_and_tag_explorer_links(&html, BASE, 10);
        assert_eq!(links.len(), 10);
    }

    #[test]
    fn test_dedup_of_equivalent_urls() {
        let html = r#"<a href="/digi/com/cto/view?nr=1">a</a>
                      <a href="/digi/digi/com/cto/view?nr=1">b</a>"#;
        let links = filter_and_tag_explorer_links(html, BASE, 200);
        assert_eq!(links.len(), 1);
    }
}
