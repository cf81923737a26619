//! Persistence: record models, remote sink, local spool, dev dumps

pub mod dev;
pub mod sink;
pub mod spool;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use dev::DevStorage;
pub use sink::{RestSink, SinkError};
pub use spool::SpoolManager;

/// Complete sale record extracted from one id's pages
///
/// Owned exclusively by the run that produced it until handed to the sink
/// or spool. `data` carries the gate outcome and, when the gate passed, the
/// per-page extraction results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Sale number, the primary key everywhere
    pub nr: u32,
    pub fetched_at: DateTime<Utc>,
    /// "ok", "failed" or "not_found"
    pub status: String,
    /// All extracted data, redacted before persistence
    pub data: Value,
}

impl SaleRecord {
    pub fn new(nr: u32, status: &str, data: Value) -> Self {
        Self {
            nr,
            fetched_at: Utc::now(),
            status: status.to_string(),
            data,
        }
    }
}

/// Result of fetching and extracting one page; transient within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub status_code: u16,
    pub final_url: String,
    pub content_hash: String,
    pub content_length: usize,
    /// Open string-keyed extraction payload; the site's field set is not
    /// contractually fixed
    pub extracted: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sale_record_roundtrip() {
        let record = SaleRecord::new(52001, "ok", json!({"gate_passed": false}));
        let serialized = serde_json::to_string(&record).unwrap();
        let parsed: SaleRecord = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed.nr, 52001);
        assert_eq!(parsed.status, "ok");
        assert_eq!(parsed.data["gate_passed"], false);
    }
}
