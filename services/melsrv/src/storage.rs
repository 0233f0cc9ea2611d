//! Durable batch output
//!
//! Each flush writes one JSON file per source: `{timestamp: record}`. Files
//! are written under a `.tmp` name and renamed to `.sm.json` once complete,
//! so readers never see partial output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, error};

use crate::error::{MelsrvError, Result};
use crate::runtime::batch::Batch;

pub const TEMP_SUFFIX: &str = "tmp";
pub const FINAL_SUFFIX: &str = "sm.json";

#[derive(Debug, Clone)]
pub struct BatchWriter {
    output_dir: PathBuf,
}

impl BatchWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write a batch; returns the final paths, one per source
    pub async fn write(&self, batch: &Batch) -> Result<Vec<PathBuf>> {
        if batch.records.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                let err = MelsrvError::storage(format!(
                    "Cannot create output directory {}: {}",
                    self.output_dir.display(),
                    e
                ));
                error!("{}", err);
                err
            })?;

        let mut by_source: BTreeMap<&str, serde_json::Map<String, serde_json::Value>> =
            BTreeMap::new();
        for record in &batch.records {
            by_source
                .entry(record.source.as_str())
                .or_default()
                .insert(record.timestamp_key(), serde_json::to_value(record)?);
        }

        let stamp = batch.window_start.format("%Y%m%dT%H%M%S%3f").to_string();
        let mut written = Vec::with_capacity(by_source.len());
        for (source, records) in by_source {
            let body = serde_json::to_vec_pretty(&records)?;
            let path = self
                .write_atomic(source, &stamp, &body)
                .await
                .inspect_err(|e| error!("{}", e))?;
            debug!("{}: wrote {} record(s) to {}", source, records.len(), path.display());
            written.push(path);
        }
        Ok(written)
    }

    async fn write_atomic(&self, source: &str, stamp: &str, body: &[u8]) -> Result<PathBuf> {
        let suffix: u32 = rand::thread_rng().gen();
        let stem = format!("{}_{}_{:08x}", file_safe(source), stamp, suffix);
        let temp = self.output_dir.join(format!("{}.{}", stem, TEMP_SUFFIX));
        let path = self.output_dir.join(format!("{}.{}", stem, FINAL_SUFFIX));

        tokio::fs::write(&temp, body).await.map_err(|e| {
            MelsrvError::storage(format!("Cannot write {}: {}", temp.display(), e))
        })?;
        tokio::fs::rename(&temp, &path).await.map_err(|e| {
            MelsrvError::storage(format!(
                "Cannot rename {} to {}: {}",
                temp.display(),
                path.display(),
                e
            ))
        })?;
        Ok(path)
    }
}

fn file_safe(source: &str) -> String {
    source
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}
