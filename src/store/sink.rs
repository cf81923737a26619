//! Remote sink client
//!
//! The remote relational store is an external collaborator with an upsert
//! contract: run rows keyed by `nr`, page rows keyed by `(run_id,
//! page_type)`, append-only error rows, and a connectivity probe. This
//! client speaks PostgREST-style HTTP and stays deliberately thin; schema
//! beyond the upsert contract is the store's business.

use crate::config::StorageConfig;
use crate::fetch::retry::{with_retry_if, RetryPolicy};
use crate::parse::redact::{redact_str, redact_value};
use crate::store::SaleRecord;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const SINK_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_secs(2),
    max_delay: Duration::from_secs(10),
};

/// Errors from the remote sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl SinkError {
    fn is_retryable(&self) -> bool {
        match self {
            SinkError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SinkError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// PostgREST-style sink client
pub struct RestSink {
    client: Client,
    base_url: String,
    key: String,
    runs_table: String,
    pages_table: String,
    errors_table: String,
}

impl RestSink {
    /// Builds a sink from configuration; `Ok(None)` when no sink is
    /// configured.
    pub fn from_config(storage: &StorageConfig) -> crate::Result<Option<Self>> {
        let (Some(url), Some(key)) = (storage.sink_url.clone(), storage.sink_key.clone()) else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Some(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            key,
            runs_table: storage.runs_table.clone(),
            pages_table: storage.pages_table.clone(),
            errors_table: storage.errors_table.clone(),
        }))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Connectivity probe; used at startup to fail fast on a dead sink.
    pub async fn test_connection(&self) -> bool {
        let url = format!("{}?select=nr&limit=1", self.table_url(&self.runs_table));
        match self
            .client
            .get(&url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::info!("sink connection successful");
                true
            }
            Ok(response) => {
                tracing::error!("sink connection test failed: HTTP {}", response.status());
                false
            }
            Err(e) => {
                tracing::error!("sink connection test failed: {e}");
                false
            }
        }
    }

    /// Upserts the run row and all page rows for one record.
    ///
    /// The run row must land; page rows are isolated from one another, so a
    /// single page's write failure does not block the rest.
    pub async fn upsert_run_and_pages(
        &self,
        run_id: &str,
        record: &SaleRecord,
    ) -> Result<(), SinkError> {
        let run_row = redact_value(json!({
            "nr": record.nr,
            "run_id": run_id,
            "gate_passed": record.data.get("gate_passed").cloned().unwrap_or(Value::Bool(false)),
            "gate_reason": record.data.get("gate_reason").cloned().unwrap_or(Value::Null),
            "status": record.status,
            "started_at": record.fetched_at.to_rfc3339(),
            "finished_at": Utc::now().to_rfc3339(),
            "summary": record.data.get("summary").cloned().unwrap_or(Value::Null),
            "explorer_links_all": record.data.get("explorer_links_all").cloned().unwrap_or(Value::Null),
        }));
        self.upsert(&self.runs_table, "nr", &run_row).await?;

        let Some(pages) = record.data.get("pages").and_then(Value::as_object) else {
            return Ok(());
        };
        let mut page_count = 0;
        for (page_type, page) in pages {
            let page_row = redact_value(json!({
                "run_id": run_id,
                "nr": record.nr,
                "page_type": page_type,
                "url": page.get("url").cloned().unwrap_or(Value::Null),
                "status_code": page.get("status_code").cloned().unwrap_or(Value::Null),
                "final_url": page.get("final_url").cloned().unwrap_or(Value::Null),
                "html_hash": page.get("content_hash").cloned().unwrap_or(Value::Null),
                "extracted": page,
            }));
            match self
                .upsert(&self.pages_table, "run_id,page_type", &page_row)
                .await
            {
                Ok(()) => page_count += 1,
                Err(e) => {
                    tracing::warn!(
                        "page upsert failed for nr={} page={}: {e}",
                        record.nr,
                        page_type
                    );
                }
            }
        }
        tracing::debug!("upserted nr={} with {page_count} pages", record.nr);
        Ok(())
    }

    /// Appends one row to the remote error log. Best-effort: a failure to
    /// log an error must never fail the caller.
    pub async fn log_error(
        &self,
        run_id: &str,
        error_type: &str,
        message: &str,
        details: Value,
        nr: Option<u32>,
        url: Option<&str>,
    ) {
        let truncated: String = redact_str(message).chars().take(500).collect();
        let row = redact_value(json!({
            "run_id": run_id,
            "error_type": error_type,
            "error_message": truncated,
            "error_details": details,
            "nr": nr,
            "url": url,
            "created_at": Utc::now().to_rfc3339(),
        }));
        if let Err(e) = self.insert(&self.errors_table, &row).await {
            tracing::debug!("error-log insert failed: {e}");
        }
    }

    async fn upsert(&self, table: &str, on_conflict: &str, row: &Value) -> Result<(), SinkError> {
        let url = format!("{}?on_conflict={on_conflict}", self.table_url(table));
        with_retry_if(SINK_RETRY, table, SinkError::is_retryable, || async {
            let response = self
                .client
                .post(&url)
                .header("apikey", &self.key)
                .bearer_auth(&self.key)
                .header("Prefer", "resolution=merge-duplicates")
                .json(row)
                .send()
                .await?;
            check_status(response).await
        })
        .await
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<(), SinkError> {
        let url = self.table_url(table);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .json(row)
            .send()
            .await?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    Err(SinkError::Status {
        status: status.as_u16(),
        body,
    })
}
