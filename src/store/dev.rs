//! Dev-mode local storage
//!
//! In dev mode every processed record is dumped as pretty JSON (and
//! optionally the raw HTML pages, within a size cap) under the data
//! directory, so extraction output can be inspected without a sink.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct DevStorage {
    dev_dir: PathBuf,
}

impl DevStorage {
    pub fn new(dev_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dev_dir)?;
        Ok(Self {
            dev_dir: dev_dir.to_path_buf(),
        })
    }

    /// Saves one record's redacted extracted payload, and optionally the
    /// raw HTML per page type.
    pub fn save_record(
        &self,
        nr: u32,
        extracted: &Value,
        html_pages: Option<&HashMap<String, String>>,
        max_html_bytes: usize,
    ) -> std::io::Result<()> {
        let json_path = self.dev_dir.join(format!("nr_{nr}.json"));
        let pretty = serde_json::to_string_pretty(extracted)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&json_path, pretty)?;

        if let Some(pages) = html_pages {
            for (page_type, html) in pages {
                if html.len() > max_html_bytes {
                    tracing::debug!(
                        "skipping raw HTML for nr={nr} page={page_type}: {} bytes over cap",
                        html.len()
                    );
                    continue;
                }
                let html_path = self.dev_dir.join(format!("nr_{nr}_{page_type}.html"));
                std::fs::write(&html_path, html)?;
            }
        }

        tracing::debug!("saved dev dump for nr={nr} at {}", json_path.display());
        Ok(())
    }
}
