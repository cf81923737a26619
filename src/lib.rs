//! Digiscrape: a gated back-office sale scraper
//!
//! This crate crawls an authenticated back-office, decides per record whether
//! deep extraction is warranted (the "gate"), extracts structured sale data
//! from five related pages, and persists results durably with replay-safe
//! recovery via a local progress ledger and an on-disk spool.

pub mod auth;
pub mod config;
pub mod fetch;
pub mod parse;
pub mod run;
pub mod state;
pub mod store;

use thiserror::Error;

/// Main error type for digiscrape operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] store::SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Run aborted: {0}")]
    Aborted(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while fetching one URL
///
/// The retry wrapper in `fetch::retry` consults [`FetchError::is_retryable`]
/// to decide which of these deserve another attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    RetryableStatus { url: String, status: u16 },

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Authentication failed: still on login page after relogin for {url}")]
    LoginPagePersists { url: String },

    #[error(
        "Double session persists after re-authentication for {url}; \
         reduce concurrency or the per-domain rate"
    )]
    DoubleSessionPersists { url: String },

    #[error("Authentication failed: relogin unsuccessful for {url}")]
    ReloginFailed { url: String },
}

impl FetchError {
    /// Whether another attempt with backoff can reasonably succeed.
    ///
    /// Auth failures are excluded: they are recovered in-place by the fetch
    /// client (relogin plus one retry) and are final once surfaced here.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            FetchError::RetryableStatus { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for digiscrape operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use parse::gate::{check_gate, GateOutcome};
pub use parse::redact::{redact_str, redact_value};
pub use store::SaleRecord;
