//! Durable per-record progress ledger
//!
//! One SQLite row per record id tracks the terminal outcome of its last
//! processing attempt. The ledger is what makes runs resumable: a record
//! marked `ok` is never re-fetched unless explicitly forced.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// Stored error text is truncated to this many characters
const MAX_ERROR_LEN: usize = 500;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS scrape_progress (
    nr INTEGER PRIMARY KEY,
    status TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_progress_status ON scrape_progress(status);
";

/// Terminal outcome of one record's processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Ok,
    Failed,
    NotFound,
}

impl ProgressStatus {
    pub fn to_db_string(self) -> &'static str {
        match self {
            ProgressStatus::Ok => "ok",
            ProgressStatus::Failed => "failed",
            ProgressStatus::NotFound => "not_found",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(ProgressStatus::Ok),
            "failed" => Some(ProgressStatus::Failed),
            "not_found" => Some(ProgressStatus::NotFound),
            _ => None,
        }
    }
}

/// One ledger row
#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub nr: u32,
    pub status: ProgressStatus,
    pub fetched_at: String,
    pub error: Option<String>,
}

/// SQLite-backed progress ledger
pub struct StateLedger {
    conn: Connection,
}

impl StateLedger {
    /// Opens (or creates) the ledger database at the given path.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::info!("progress ledger initialized at {}", path.display());
        Ok(Self { conn })
    }

    /// In-memory ledger for tests.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Whether the record completed successfully. Only `ok` counts; a later
    /// failure overwrites and makes the record eligible again.
    pub fn is_done(&self, nr: u32) -> Result<bool, rusqlite::Error> {
        let row: Option<u32> = self
            .conn
            .query_row(
                "SELECT nr FROM scrape_progress WHERE nr = ?1 AND status = 'ok'",
                params![nr],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    pub fn mark_done(&self, nr: u32) -> Result<(), rusqlite::Error> {
        self.upsert(nr, ProgressStatus::Ok, None)
    }

    pub fn mark_failed(&self, nr: u32, error: &str) -> Result<(), rusqlite::Error> {
        let truncated: String = error.chars().take(MAX_ERROR_LEN).collect();
        self.upsert(nr, ProgressStatus::Failed, Some(&truncated))
    }

    pub fn mark_not_found(&self, nr: u32) -> Result<(), rusqlite::Error> {
        self.upsert(nr, ProgressStatus::NotFound, None)
    }

    fn upsert(
        &self,
        nr: u32,
        status: ProgressStatus,
        error: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO scrape_progress (nr, status, fetched_at, error)
             VALUES (?1, ?2, ?3, ?4)",
            params![nr, status.to_db_string(), now, error],
        )?;
        Ok(())
    }

    /// Gets one ledger entry.
    pub fn entry(&self, nr: u32) -> Result<Option<ProgressEntry>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT nr, status, fetched_at, error FROM scrape_progress WHERE nr = ?1",
                params![nr],
                |row| {
                    Ok(ProgressEntry {
                        nr: row.get(0)?,
                        status: ProgressStatus::from_db_string(&row.get::<_, String>(1)?)
                            .unwrap_or(ProgressStatus::Failed),
                        fetched_at: row.get(2)?,
                        error: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    /// Ids in `[start, end]` not yet marked `ok`, ascending.
    ///
    /// This is the basis of resumable runs: the full integer range minus
    /// the set of completed ids.
    pub fn next_undone(&self, start: u32, end: u32) -> Result<Vec<u32>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT nr FROM scrape_progress WHERE nr >= ?1 AND nr <= ?2 AND status = 'ok'",
        )?;
        let done: HashSet<u32> = stmt
            .query_map(params![start, end], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok((start..=end).filter(|nr| !done.contains(nr)).collect())
    }

    /// Per-status row counts.
    pub fn stats(&self) -> Result<Vec<(String, u64)>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM scrape_progress GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_done_then_is_done() {
        let ledger = StateLedger::open_in_memory().unwrap();
        assert!(!ledger.is_done(42).unwrap());
        ledger.mark_done(42).unwrap();
        assert!(ledger.is_done(42).unwrap());
    }

    #[test]
    fn test_failure_overwrites_done() {
        let ledger = StateLedger::open_in_memory().unwrap();
        ledger.mark_done(42).unwrap();
        ledger.mark_failed(42, "boom").unwrap();
        assert!(!ledger.is_done(42).unwrap());
        let entry = ledger.entry(42).unwrap().unwrap();
        assert_eq!(entry.status, ProgressStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_error_text_truncated() {
        let ledger = StateLedger::open_in_memory().unwrap();
        let long_error = "x".repeat(2000);
        ledger.mark_failed(1, &long_error).unwrap();
        let entry = ledger.entry(1).unwrap().unwrap();
        assert_eq!(entry.error.unwrap().len(), 500);
    }

    #[test]
    fn test_next_undone_is_range_minus_ok() {
        let ledger = StateLedger::open_in_memory().unwrap();
        ledger.mark_done(2).unwrap();
        ledger.mark_failed(3, "err").unwrap();
        ledger.mark_not_found(4).unwrap();
        let undone = ledger.next_undone(1, 5).unwrap();
        // failed and not_found stay eligible; only ok is excluded
        assert_eq!(undone, vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_next_undone_sorted_no_duplicates() {
        let ledger = StateLedger::open_in_memory().unwrap();
        for nr in [10u32, 12, 14] {
            ledger.mark_done(nr).unwrap();
        }
        let undone = ledger.next_undone(10, 15).unwrap();
        assert_eq!(undone, vec![11, 13, 15]);
    }

    #[test]
    fn test_not_found_recorded() {
        let ledger = StateLedger::open_in_memory().unwrap();
        ledger.mark_not_found(9).unwrap();
        let entry = ledger.entry(9).unwrap().unwrap();
        assert_eq!(entry.status, ProgressStatus::NotFound);
        assert!(!ledger.is_done(9).unwrap());
    }

    #[test]
    fn test_stats_counts_by_status() {
        let ledger = StateLedger::open_in_memory().unwrap();
        ledger.mark_done(1).unwrap();
        ledger.mark_done(2).unwrap();
        ledger.mark_failed(3, "err").unwrap();
        let stats = ledger.stats().unwrap();
        assert!(stats.contains(&("ok".to_string(), 2)));
        assert!(stats.contains(&("failed".to_string(), 1)));
    }
}
