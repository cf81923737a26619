//! Disk spool: durable fallback when the remote sink is unavailable
//!
//! Each flush attempt gets its own `batch_<id>.jsonl` file of
//! newline-delimited redacted records. A batch file is only deleted after
//! its records are confirmed durable in the remote sink, so a crashed or
//! offline run loses nothing.

use crate::store::SaleRecord;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Manages JSONL spool files for offline buffering
pub struct SpoolManager {
    spool_dir: PathBuf,
}

impl SpoolManager {
    pub fn new(spool_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(spool_dir)?;
        Ok(Self {
            spool_dir: spool_dir.to_path_buf(),
        })
    }

    fn batch_path(&self, batch_id: u64) -> PathBuf {
        self.spool_dir.join(format!("batch_{batch_id}.jsonl"))
    }

    /// Appends one record to a batch file.
    pub async fn write_record(&self, record: &SaleRecord, batch_id: u64) -> crate::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.batch_path(batch_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Reads all records of a batch; unparseable lines are skipped with a
    /// warning rather than failing the batch.
    pub async fn read_batch(&self, batch_id: u64) -> crate::Result<Vec<SaleRecord>> {
        let path = self.batch_path(batch_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SaleRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping bad spool line in batch {batch_id}: {e}"),
            }
        }
        Ok(records)
    }

    /// Removes a batch file once its records are durable in the sink.
    pub async fn delete_batch(&self, batch_id: u64) -> crate::Result<()> {
        let path = self.batch_path(batch_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    /// All spooled batch ids, ascending.
    pub fn list_batches(&self) -> Vec<u64> {
        let Ok(entries) = std::fs::read_dir(&self.spool_dir) else {
            return Vec::new();
        };
        let mut ids: Vec<u64> = entries
            .filter_map(|entry| {
                let name = entry.ok()?.file_name();
                let name = name.to_str()?;
                name.strip_prefix("batch_")?
                    .strip_suffix(".jsonl")?
                    .parse()
                    .ok()
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(nr: u32) -> SaleRecord {
        SaleRecord::new(nr, "ok", json!({"gate_passed": false, "nr": nr}))
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let spool = SpoolManager::new(dir.path()).unwrap();

        spool.write_record(&record(1), 7).await.unwrap();
        spool.write_record(&record(2), 7).await.unwrap();

        let records = spool.read_batch(7).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].nr, 1);
        assert_eq!(records[1].nr, 2);
    }

    #[tokio::test]
    async fn test_batches_are_separate_files() {
        let dir = TempDir::new().unwrap();
        let spool = SpoolManager::new(dir.path()).unwrap();

        spool.write_record(&record(1), 1).await.unwrap();
        spool.write_record(&record(2), 2).await.unwrap();

        assert_eq!(spool.list_batches(), vec![1, 2]);
        assert_eq!(spool.read_batch(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let dir = TempDir::new().unwrap();
        let spool = SpoolManager::new(dir.path()).unwrap();

        spool.write_record(&record(1), 3).await.unwrap();
        spool.delete_batch(3).await.unwrap();

        assert!(spool.list_batches().is_empty());
        assert!(spool.read_batch(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_batch_is_ok() {
        let dir = TempDir::new().unwrap();
        let spool = SpoolManager::new(dir.path()).unwrap();
        assert!(spool.delete_batch(99).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let spool = SpoolManager::new(dir.path()).unwrap();
        spool.write_record(&record(1), 5).await.unwrap();

        // Corrupt the file with a partial line.
        let path = dir.path().join("batch_5.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{truncated\n");
        std::fs::write(&path, content).unwrap();

        let records = spool.read_batch(5).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
