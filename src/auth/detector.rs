//! Detectors for authentication-loss responses
//!
//! Two pure functions over a response's body, status and final URL. Both are
//! heuristic: the weak-indicator paths require a configurable number of
//! matches because single phrases ("connexion", "fermer la session") also
//! occur in ordinary UI text.

use regex::Regex;
use std::sync::OnceLock;

/// Strong structural login-page indicators: titles/headings, form field
/// names, login-classed elements. Any single match is decisive.
const LOGIN_STRONG_PATTERNS: &[&str] = &[
    r"<title[^>]*>[^<]*connexion[^<]*</title>",
    r"<h1[^>]*>[^<]*se connecter[^<]*</h1>",
    r"<h2[^>]*>[^<]*connexion[^<]*</h2>",
    r#"name=["']username["']"#,
    r#"name=["']password["']"#,
    r#"id=["']login["']"#,
    r#"class=["'][^"']*login[^"']*["']"#,
];

/// Weak login vocabulary; several of these must co-occur.
const LOGIN_WEAK_INDICATORS: &[&str] =
    &["se connecter", "connexion", "identifiant", "mot de passe"];

/// Vocabulary of the concurrent-session conflict popup.
const CONFLICT_PATTERNS: &[&str] = &[
    r"double session",
    r"deuxi[eè]me session.*active",
    r"session en trop",
    r"quittez et reconnectez",
    r"fermer la session",
];

fn login_strong() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        LOGIN_STRONG_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static login pattern"))
            .collect()
    })
}

fn conflict_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        CONFLICT_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static conflict pattern"))
            .collect()
    })
}

/// Detects the "double session" popup shown when too many concurrent
/// requests open parallel sessions.
///
/// Requires at least `threshold` distinct vocabulary matches; a single
/// phrase is too weak given overlap with ordinary UI text.
pub fn is_double_session(body: Option<&str>, threshold: usize) -> bool {
    let Some(body) = body else {
        return false;
    };
    if body.is_empty() {
        return false;
    }
    let lower = body.to_lowercase();
    let matches = conflict_patterns()
        .iter()
        .filter(|re| re.is_match(&lower))
        .count();
    matches >= threshold
}

/// Detects whether a response is (or redirects to) a login page.
///
/// True when any of the following holds:
/// - the status is a 302 redirect (the caller lands on login)
/// - the final URL contains a login marker
/// - the body carries a strong structural indicator
/// - the body carries at least `weak_threshold` weak vocabulary indicators
/// - the body carries the double-session popup (also requires reauth)
pub fn is_login_page(
    body: Option<&str>,
    status: u16,
    final_url: &str,
    weak_threshold: usize,
) -> bool {
    if status == 302 {
        return true;
    }

    let url_lower = final_url.to_lowercase();
    if url_lower.contains("login") || url_lower.contains("connexion") {
        return true;
    }

    let Some(body) = body else {
        return false;
    };
    if body.is_empty() {
        return false;
    }
    let lower = body.to_lowercase();

    if login_strong().iter().any(|re| re.is_match(&lower)) {
        return true;
    }

    let weak_count = LOGIN_WEAK_INDICATORS
        .iter()
        .filter(|needle| lower.contains(*needle))
        .count();
    if weak_count >= weak_threshold {
        return true;
    }

    is_double_session(Some(body), weak_threshold)
}
