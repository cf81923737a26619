//! HTTP fetch client
//!
//! Composes the rate limiter, session manager and retry policy into one
//! `fetch` operation. Per call:
//!
//! 1. Acquire the rate-limit slot for the URL's domain
//! 2. Ensure the session is authenticated
//! 3. Issue the GET with the session cookie attached
//! 4. Recover in-place from double-session conflicts (full session reset,
//!    one retry) and login pages (relogin, one retry)
//! 5. Surface retryable statuses to the retry wrapper; 404 is returned
//!    as a well-formed response, never retried

use crate::auth::detector::{is_double_session, is_login_page};
use crate::auth::session::{AuthMode, SessionManager};
use crate::config::Config;
use crate::fetch::rate_limit::RateLimiter;
use crate::fetch::retry::{with_retry, RetryPolicy};
use crate::{FetchError, FetchResult};
use reqwest::header::COOKIE;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// Statuses worth another attempt after backoff
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// A fetched page with its body already read
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL as requested
    pub url: String,
    /// The URL the response actually came from
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl FetchedPage {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Builds the HTTP client shared by fetches and the session manager.
///
/// Redirects are handled manually so that a redirect-to-login is visible
/// as an invalidation signal rather than silently followed.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent("Mozilla/5.0 (compatible; digiscrape/1.0)")
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Authenticated, rate-limited, retrying HTTP fetcher
pub struct FetchClient {
    client: Client,
    rate_limiter: RateLimiter,
    session: SessionManager,
    policy: RetryPolicy,
    conflict_threshold: usize,
    login_weak_threshold: usize,
}

impl FetchClient {
    pub fn new(config: &Config, mode: AuthMode) -> crate::Result<Self> {
        let client = build_http_client(Duration::from_secs(config.scraper.timeout_secs))?;
        let session = SessionManager::new(
            client.clone(),
            config.backoffice.clone(),
            &config.auth,
            mode,
        );
        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(config.scraper.rate_per_domain),
            session,
            policy: RetryPolicy {
                max_attempts: config.scraper.max_retries,
                ..RetryPolicy::default()
            },
            conflict_threshold: config.auth.conflict_threshold,
            login_weak_threshold: config.auth.login_weak_threshold,
        })
    }

    /// The session manager owning this client's credential.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Fetches one URL, retrying transient failures per the retry policy.
    pub async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        with_retry(self.policy, url, || self.fetch_attempt(url)).await
    }

    async fn fetch_attempt(&self, url: &str) -> FetchResult<FetchedPage> {
        self.rate_limiter.acquire(url).await;
        self.session.ensure_authenticated().await?;

        let mut page = self.send(url).await?;

        // A concurrent-session conflict poisons the whole session: clear
        // everything, authenticate from scratch, and retry exactly once.
        if is_double_session(Some(&page.body), self.conflict_threshold) {
            tracing::warn!(url, "double session popup detected, resetting session");
            self.session.invalidate().await;
            self.session.ensure_authenticated().await?;
            page = self.send(url).await?;
            if is_double_session(Some(&page.body), self.conflict_threshold) {
                return Err(FetchError::DoubleSessionPersists {
                    url: url.to_string(),
                });
            }
        }

        if is_login_page(
            Some(&page.body),
            page.status,
            &page.final_url,
            self.login_weak_threshold,
        ) {
            let relogged = self
                .session
                .check_and_relogin(Some(&page.body), page.status, &page.final_url)
                .await;
            if relogged {
                page = self.send(url).await?;
                if is_login_page(
                    Some(&page.body),
                    page.status,
                    &page.final_url,
                    self.login_weak_threshold,
                ) {
                    return Err(FetchError::LoginPagePersists {
                        url: url.to_string(),
                    });
                }
            } else {
                return Err(FetchError::ReloginFailed {
                    url: url.to_string(),
                });
            }
        }

        if RETRYABLE_STATUSES.contains(&page.status) {
            return Err(FetchError::RetryableStatus {
                url: url.to_string(),
                status: page.status,
            });
        }

        Ok(page)
    }

    async fn send(&self, url: &str) -> FetchResult<FetchedPage> {
        let cookie = self.session.cookie_header().await?;
        let response = self
            .client
            .get(url)
            .header(COOKIE, cookie)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }

    /// Fetches a collection concurrently, isolating per-URL failures.
    ///
    /// A URL that fails all its attempts maps to `None`; one failing URL
    /// never fails the batch.
    pub async fn fetch_all(&self, urls: &[String]) -> HashMap<String, Option<FetchedPage>> {
        let fetches = urls.iter().map(|url| async move {
            match self.fetch(url).await {
                Ok(page) => (url.clone(), Some(page)),
                Err(e) => {
                    tracing::error!("failed to fetch {url}: {e}");
                    (url.clone(), None)
                }
            }
        });
        futures::future::join_all(fetches).await.into_iter().collect()
    }
}
