use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for digiscrape
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backoffice: BackofficeConfig,
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

/// Target back-office and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct BackofficeConfig {
    /// Origin of the back-office, e.g. "https://bo.example.com"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Login form path relative to the base URL
    #[serde(rename = "login-path", default = "default_login_path")]
    pub login_path: String,

    /// Name of the session cookie issued at login
    #[serde(rename = "session-cookie-name", default = "default_cookie_name")]
    pub session_cookie_name: String,

    /// Login username; required in login-only mode
    pub username: Option<String>,

    /// Login password; required in login-only mode
    pub password: Option<String>,

    /// Pre-supplied session token (`name=value`); required in cookie-only mode
    #[serde(rename = "session-cookie")]
    pub session_cookie: Option<String>,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Maximum number of record pipelines in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Records buffered before a flush to the sink
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Record ids processed per chunk; the buffer is flushed once per chunk
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Requests per second per domain; 0 disables throttling
    #[serde(rename = "rate-per-domain", default = "default_rate")]
    pub rate_per_domain: f64,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts per URL for transient failures
    #[serde(rename = "max-retries", default = "default_retries")]
    pub max_retries: u32,

    /// Explorer links kept per page
    #[serde(rename = "explorer-max-links", default = "default_explorer_max")]
    pub explorer_max_links: usize,

    /// Raw HTML above this size is never stored
    #[serde(rename = "max-html-bytes", default = "default_max_html")]
    pub max_html_bytes: usize,
}

/// Session validation and detector tuning
///
/// The weak-indicator thresholds are heuristic; they are configurable rather
/// than hardcoded because the site markup they match can drift.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Seconds a validated session is trusted without re-probing
    #[serde(rename = "freshness-secs", default = "default_freshness")]
    pub freshness_secs: u64,

    /// Weak login-page indicators required before declaring a login page
    #[serde(rename = "login-weak-threshold", default = "default_threshold")]
    pub login_weak_threshold: usize,

    /// Conflict-vocabulary matches required before declaring a double session
    #[serde(rename = "conflict-threshold", default = "default_threshold")]
    pub conflict_threshold: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness(),
            login_weak_threshold: default_threshold(),
            conflict_threshold: default_threshold(),
        }
    }
}

/// Local storage layout and remote sink endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root for the ledger database, spool and dev dumps
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Remote sink REST endpoint; absent means ledger/spool only
    #[serde(rename = "sink-url")]
    pub sink_url: Option<String>,

    /// Service key sent with every sink request
    #[serde(rename = "sink-key")]
    pub sink_key: Option<String>,

    /// Sink table receiving one row per (nr, run)
    #[serde(rename = "runs-table", default = "default_runs_table")]
    pub runs_table: String,

    /// Sink table receiving one row per (run, page-type)
    #[serde(rename = "pages-table", default = "default_pages_table")]
    pub pages_table: String,

    /// Sink table receiving append-only error rows
    #[serde(rename = "errors-table", default = "default_errors_table")]
    pub errors_table: String,
}

impl StorageConfig {
    /// Path of the progress ledger database
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("state.db")
    }

    /// Directory holding spooled batches
    pub fn spool_dir(&self) -> PathBuf {
        self.data_dir.join("spool")
    }

    /// Directory holding dev-mode record dumps
    pub fn dev_dir(&self) -> PathBuf {
        self.data_dir.join("dev")
    }

    /// Path of the JSONL metrics export
    pub fn metrics_path(&self) -> PathBuf {
        self.data_dir.join("metrics.jsonl")
    }
}

fn default_login_path() -> String {
    "/digi/com/login".to_string()
}

fn default_cookie_name() -> String {
    "DigifactoryBO".to_string()
}

fn default_concurrency() -> usize {
    20
}

fn default_batch_size() -> usize {
    1000
}

fn default_chunk_size() -> usize {
    500
}

fn default_rate() -> f64 {
    2.0
}

fn default_timeout() -> u64 {
    20
}

fn default_retries() -> u32 {
    5
}

fn default_explorer_max() -> usize {
    200
}

fn default_max_html() -> usize {
    1_500_000
}

fn default_freshness() -> u64 {
    30
}

fn default_threshold() -> usize {
    2
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_runs_table() -> String {
    "cto_runs".to_string()
}

fn default_pages_table() -> String {
    "cto_pages".to_string()
}

fn default_errors_table() -> String {
    "cto_errors".to_string()
}
