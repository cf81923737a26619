//! Gate check: decides whether a record warrants deep extraction
//!
//! The gate looks at the main view page only. Passing it triggers four more
//! page fetches and full extraction; failing it produces a minimal record.
//! Gate failure is therefore a successful outcome, not an error.

use regex::Regex;
use std::sync::OnceLock;

fn phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)location\s+de\s+v[eé]hicule").expect("static gate pattern")
    })
}

fn type_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"type\s+de\s+vente.*location[_-]?subscription").expect("static gate pattern")
    })
}

/// Result of the gate check
///
/// `reason` is a short stable code suitable for persistence. `matched_text`
/// is diagnostic payload only captured in verbose mode; it must never reach
/// production records.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub passed: bool,
    pub reason: String,
    pub match_count: usize,
    pub matched_text: Option<String>,
}

impl GateOutcome {
    fn fail(reason: &str) -> Self {
        Self {
            passed: false,
            reason: reason.to_string(),
            match_count: 0,
            matched_text: None,
        }
    }
}

/// Gate check with production defaults (no diagnostic capture).
pub fn check_gate(html: &str) -> GateOutcome {
    check_gate_verbose(html, false)
}

/// Gate check over a single page's HTML.
///
/// Passes when any of three signals is present:
/// - the exact `<h5>Location de véhicule</h5>` heading
/// - the phrase with flexible whitespace, case-insensitive
/// - the categorical sale type `Location_Subscription`
///
/// Empty input fails with the distinct reason `empty` and never errors.
pub fn check_gate_verbose(html: &str, verbose: bool) -> GateOutcome {
    if html.trim().is_empty() {
        return GateOutcome::fail("empty");
    }

    let lower = html.to_lowercase();

    if lower.contains("<h5>location de véhicule</h5>") {
        let count = phrase_re().find_iter(html).count().max(1);
        return GateOutcome {
            passed: true,
            reason: "h5_heading".to_string(),
            match_count: count,
            matched_text: verbose.then(|| "<h5>Location de véhicule</h5>".to_string()),
        };
    }

    let matches: Vec<_> = phrase_re().find_iter(html).collect();
    if !matches.is_empty() {
        return GateOutcome {
            passed: true,
            reason: "phrase_match".to_string(),
            match_count: matches.len(),
            matched_text: verbose.then(|| matches[0].as_str().to_string()),
        };
    }

    if type_code_re().is_match(&lower) {
        return GateOutcome {
            passed: true,
            reason: "type_code".to_string(),
            match_count: 1,
            matched_text: verbose.then(|| "location_subscription".to_string()),
        };
    }

    GateOutcome::fail("no_match")
}
