//! Session management with automatic login and refresh
//!
//! One [`SessionManager`] owns the authentication credential for a run. The
//! credential is read by many concurrent fetches but mutated (login,
//! invalidation) only behind the write half of an async lock, so a fetch can
//! never observe a torn credential mid-transition.

use crate::auth::detector::is_login_page;
use crate::config::{AuthConfig, BackofficeConfig};
use crate::fetch::endpoints::probe_url;
use crate::fetch::retry::{with_retry, RetryPolicy};
use crate::{FetchError, FetchResult};
use reqwest::header::{HeaderMap, COOKIE, LOCATION, SET_COOKIE};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

/// Retry policy for the login request itself
const LOGIN_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_secs(2),
    max_delay: Duration::from_secs(10),
};

/// Redirect hops followed while hunting for the session cookie after login
const LOGIN_REDIRECT_LIMIT: usize = 3;

/// How the session credential is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Static token if configured, credential login otherwise
    Default,
    /// Use the pre-supplied static token verbatim; never log in
    CookieOnly,
    /// Always perform credential login; ignore any static token
    LoginOnly,
}

#[derive(Debug, Default)]
struct SessionState {
    /// Current credential as a `Name=value` cookie pair
    cookie: Option<String>,
    /// Last successful validation; `None` forces a probe on next use
    validated_at: Option<Instant>,
}

enum ProbeOutcome {
    Valid,
    Invalid,
    /// The probe itself failed (network); not evidence of invalidation
    Unknown,
}

/// Manages the authentication session with automatic refresh
pub struct SessionManager {
    client: Client,
    backoffice: BackofficeConfig,
    freshness: Duration,
    login_weak_threshold: usize,
    mode: AuthMode,
    state: RwLock<SessionState>,
    relogin_failed: AtomicBool,
}

impl SessionManager {
    pub fn new(
        client: Client,
        backoffice: BackofficeConfig,
        auth: &AuthConfig,
        mode: AuthMode,
    ) -> Self {
        Self {
            client,
            backoffice,
            freshness: Duration::from_secs(auth.freshness_secs),
            login_weak_threshold: auth.login_weak_threshold,
            mode,
            state: RwLock::new(SessionState::default()),
            relogin_failed: AtomicBool::new(false),
        }
    }

    /// Ensures a usable credential is held, probing or logging in as needed.
    ///
    /// A credential validated within the freshness window is trusted without
    /// a probe. A failed probe *request* (as opposed to a probe that answers
    /// "invalid") leaves the credential in place: flaky networking must not
    /// cause needless re-logins.
    pub async fn ensure_authenticated(&self) -> FetchResult<()> {
        {
            let state = self.state.read().await;
            if state.cookie.is_some() {
                if let Some(at) = state.validated_at {
                    if at.elapsed() < self.freshness {
                        return Ok(());
                    }
                }
            }
        }

        let mut state = self.state.write().await;
        // Re-check: another task may have validated or logged in meanwhile.
        if let Some(cookie) = state.cookie.clone() {
            if let Some(at) = state.validated_at {
                if at.elapsed() < self.freshness {
                    return Ok(());
                }
            }
            match self.probe(&cookie).await {
                ProbeOutcome::Valid => {
                    state.validated_at = Some(Instant::now());
                    return Ok(());
                }
                ProbeOutcome::Unknown => {
                    tracing::debug!("session probe failed transiently, keeping credential");
                    return Ok(());
                }
                ProbeOutcome::Invalid => {
                    tracing::warn!("session expired, re-authenticating");
                }
            }
        }

        self.login_locked(&mut state).await
    }

    /// Performs a login immediately, replacing any held credential.
    pub async fn login(&self) -> FetchResult<()> {
        let mut state = self.state.write().await;
        self.login_locked(&mut state).await
    }

    /// Checks a response for login-page signals and relogs in if needed.
    ///
    /// Returns whether a relogin was attempted and succeeded. On failure the
    /// sticky failure flag is set for the caller to consult.
    pub async fn check_and_relogin(
        &self,
        body: Option<&str>,
        status: u16,
        final_url: &str,
    ) -> bool {
        if !is_login_page(body, status, final_url, self.login_weak_threshold) {
            return false;
        }
        tracing::warn!(url = final_url, "detected login page, attempting relogin");
        match self.login().await {
            Ok(()) => {
                self.relogin_failed.store(false, Ordering::SeqCst);
                true
            }
            Err(e) => {
                tracing::error!("relogin failed: {e}");
                self.relogin_failed.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    /// Drops the credential and all validation state.
    ///
    /// Used on double-session conflicts, which require a completely fresh
    /// session rather than a refresh of the current one.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.cookie = None;
        state.validated_at = None;
    }

    /// The `Cookie` header value for authenticated requests.
    pub async fn cookie_header(&self) -> FetchResult<String> {
        let state = self.state.read().await;
        state.cookie.clone().ok_or_else(|| {
            FetchError::Login("not authenticated; call ensure_authenticated first".to_string())
        })
    }

    pub fn is_authenticated(&self) -> bool {
        // Non-blocking best-effort view, used only for logging.
        self.state
            .try_read()
            .map(|s| s.cookie.is_some())
            .unwrap_or(false)
    }

    pub fn relogin_failed(&self) -> bool {
        self.relogin_failed.load(Ordering::SeqCst)
    }

    async fn login_locked(&self, state: &mut SessionState) -> FetchResult<()> {
        match self.mode {
            AuthMode::CookieOnly => {
                let cookie = self.backoffice.session_cookie.as_deref().ok_or_else(|| {
                    FetchError::Login("cookie-only mode requires session-cookie".to_string())
                })?;
                state.cookie = Some(self.normalize_cookie_pair(cookie));
                state.validated_at = Some(Instant::now());
                tracing::info!("using provided session cookie (cookie-only mode)");
                return Ok(());
            }
            AuthMode::LoginOnly => {
                if self.backoffice.username.is_none() || self.backoffice.password.is_none() {
                    return Err(FetchError::Login(
                        "login-only mode requires username/password".to_string(),
                    ));
                }
            }
            AuthMode::Default => {
                if let Some(cookie) = self.backoffice.session_cookie.as_deref() {
                    state.cookie = Some(self.normalize_cookie_pair(cookie));
                    state.validated_at = Some(Instant::now());
                    tracing::info!("using provided session cookie");
                    return Ok(());
                }
            }
        }

        let (username, password) = match (
            self.backoffice.username.as_deref(),
            self.backoffice.password.as_deref(),
        ) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                return Err(FetchError::Login(
                    "either session-cookie or username/password must be provided".to_string(),
                ))
            }
        };

        tracing::info!(username, "logging in");
        let cookie = self.perform_login(username, password).await?;
        state.cookie = Some(cookie);
        state.validated_at = Some(Instant::now());
        tracing::info!("login successful");
        Ok(())
    }

    async fn perform_login(&self, username: &str, password: &str) -> FetchResult<String> {
        let login_url = format!(
            "{}{}",
            self.backoffice.base_url.trim_end_matches('/'),
            self.backoffice.login_path
        );
        let form = [("username", username), ("password", password)];

        let mut response = with_retry(LOGIN_RETRY, &login_url, || async {
            self.client
                .post(&login_url)
                .form(&form)
                .send()
                .await
                .map_err(|e| FetchError::Network {
                    url: login_url.clone(),
                    source: e,
                })
        })
        .await?;

        let cookie_name = &self.backoffice.session_cookie_name;
        let mut hops = 0;
        loop {
            if let Some(pair) = extract_session_token(response.headers(), cookie_name) {
                return Ok(pair);
            }

            let status = response.status();
            if !status.is_redirection() || hops >= LOGIN_REDIRECT_LIMIT {
                if !status.is_success() && !status.is_redirection() {
                    return Err(FetchError::Login(format!(
                        "login request returned HTTP {status}"
                    )));
                }
                return Err(FetchError::Login(format!(
                    "no {cookie_name} session cookie found in login response"
                )));
            }

            // The cookie may be set on the redirect target instead.
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    FetchError::Login("login redirect without Location header".to_string())
                })?;
            let next = Url::parse(&login_url)
                .and_then(|base| base.join(location))
                .map_err(|e| FetchError::Login(format!("bad login redirect {location}: {e}")))?;

            response = self
                .client
                .get(next.clone())
                .send()
                .await
                .map_err(|e| FetchError::Network {
                    url: next.to_string(),
                    source: e,
                })?;
            hops += 1;
        }
    }

    /// Validation probe against a known protected resource.
    async fn probe(&self, cookie: &str) -> ProbeOutcome {
        let url = probe_url(&self.backoffice.base_url);
        let response = match self
            .client
            .get(&url)
            .header(COOKIE, cookie)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("session validation error: {e}");
                return ProbeOutcome::Unknown;
            }
        };

        let status = response.status();
        if status.as_u16() == 302 {
            return ProbeOutcome::Invalid;
        }
        if status.as_u16() == 200 {
            let body = match response.text().await {
                Ok(b) => b,
                Err(e) => {
                    tracing::debug!("session validation error: {e}");
                    return ProbeOutcome::Unknown;
                }
            };
            let lower = body.to_lowercase();
            if lower.contains("se connecter") || lower.contains("connexion") {
                return ProbeOutcome::Invalid;
            }
            return ProbeOutcome::Valid;
        }
        ProbeOutcome::Invalid
    }

    fn normalize_cookie_pair(&self, raw: &str) -> String {
        if raw.contains('=') {
            raw.to_string()
        } else {
            format!("{}={}", self.backoffice.session_cookie_name, raw)
        }
    }
}

/// Extracts the session token from `Set-Cookie` headers.
///
/// Pure function over response headers: matches the cookie name
/// case-insensitively and returns the full `Name=value` pair, or `None`
/// when the cookie is absent or empty.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else {
            continue;
        };
        let pair = raw.split(';').next().unwrap_or("").trim();
        if let Some((name, token)) = pair.split_once('=') {
            if name.trim().eq_ignore_ascii_case(cookie_name) && !token.trim().is_empty() {
                return Some(format!("{}={}", name.trim(), token.trim()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers_with(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for v in values {
            headers.append(SET_COOKIE, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn test_extract_token_simple() {
        let headers = headers_with(&["DigifactoryBO=abc123; Path=/; HttpOnly"]);
        assert_eq!(
            extract_session_token(&headers, "DigifactoryBO"),
            Some("DigifactoryBO=abc123".to_string())
        );
    }

    #[test]
    fn test_extract_token_case_insensitive() {
        let headers = headers_with(&["digifactorybo=xyz; Secure"]);
        assert_eq!(
            extract_session_token(&headers, "DigifactoryBO"),
            Some("digifactorybo=xyz".to_string())
        );
    }

    #[test]
    fn test_extract_token_skips_other_cookies() {
        let headers = headers_with(&["lang=fr; Path=/", "DigifactoryBO=tok; Path=/"]);
        assert_eq!(
            extract_session_token(&headers, "DigifactoryBO"),
            Some("DigifactoryBO=tok".to_string())
        );
    }

    #[test]
    fn test_extract_token_absent() {
        let headers = headers_with(&["lang=fr; Path=/"]);
        assert_eq!(extract_session_token(&headers, "DigifactoryBO"), None);
    }

    #[test]
    fn test_extract_token_empty_value() {
        let headers = headers_with(&["DigifactoryBO=; Max-Age=0"]);
        assert_eq!(extract_session_token(&headers, "DigifactoryBO"), None);
    }
}
