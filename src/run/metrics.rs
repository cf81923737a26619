//! Throughput counters and the JSONL metrics export

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Basic throughput counters for one run
#[derive(Debug)]
pub struct Metrics {
    total: u64,
    started_at: Instant,
    counters: HashMap<&'static str, u64>,
    last_report_at: Instant,
    last_report_count: u64,
}

impl Metrics {
    pub fn new(total: u64) -> Self {
        let now = Instant::now();
        Self {
            total,
            started_at: now,
            counters: HashMap::new(),
            last_report_at: now,
            last_report_count: 0,
        }
    }

    pub fn increment(&mut self, key: &'static str) {
        *self.counters.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// Overall processing rate in records per second.
    pub fn rate(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get("processed") as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Estimated seconds remaining at the current rate.
    pub fn eta_seconds(&self) -> f64 {
        let rate = self.rate();
        if rate <= 0.0 {
            return 0.0;
        }
        let remaining = self.total.saturating_sub(self.get("processed"));
        remaining as f64 / rate
    }

    fn format_eta(&self) -> String {
        let eta = self.eta_seconds();
        if eta < 60.0 {
            format!("{eta:.0}s")
        } else if eta < 3600.0 {
            format!("{:.1}m", eta / 60.0)
        } else {
            format!("{:.1}h", eta / 3600.0)
        }
    }

    /// Logs a progress line with overall and recent rates.
    pub fn report(&mut self) {
        let processed = self.get("processed");
        let recent_elapsed = self.last_report_at.elapsed().as_secs_f64();
        let recent = processed.saturating_sub(self.last_report_count);
        let recent_rate = if recent_elapsed > 0.0 {
            recent as f64 / recent_elapsed
        } else {
            0.0
        };
        let percent = if self.total > 0 {
            processed * 100 / self.total
        } else {
            0
        };

        tracing::info!(
            "progress: {}/{} ({}%) | rate: {:.2}/s (recent: {:.2}/s) | eta: {} | ok: {} | failed: {} | not found: {}",
            processed,
            self.total,
            percent,
            self.rate(),
            recent_rate,
            self.format_eta(),
            self.get("ok"),
            self.get("failed"),
            self.get("not_found"),
        );

        self.last_report_at = Instant::now();
        self.last_report_count = processed;
    }

    pub fn summary(&self) -> Value {
        json!({
            "total": self.total,
            "processed": self.get("processed"),
            "ok": self.get("ok"),
            "failed": self.get("failed"),
            "not_found": self.get("not_found"),
            "skipped": self.get("skipped"),
            "gate_passed": self.get("gate_passed"),
            "gate_failed": self.get("gate_failed"),
            "rate": self.rate(),
            "eta_seconds": self.eta_seconds(),
            "elapsed_seconds": self.started_at.elapsed().as_secs_f64(),
        })
    }
}

/// Appends metric snapshots as JSONL, one line per export
pub struct MetricsExporter {
    path: PathBuf,
    run_id: String,
}

impl MetricsExporter {
    pub fn new(path: &Path, run_id: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
        }
    }

    pub async fn export(&self, metrics: &Value, control: &Value) -> crate::Result<()> {
        let mut line = serde_json::to_string(&json!({
            "ts": Utc::now().to_rfc3339(),
            "run_id": self.run_id,
            "metrics": metrics,
            "run_control": control,
        }))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
