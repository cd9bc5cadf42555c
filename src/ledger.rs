//! Run ledger: which source URLs made it into the PDF.
//!
//! The ledger is the only thing a run hands to bookkeeping. It is append-only
//! while the run is in progress and is consumed read-only by a
//! [`LedgerSink`] afterwards. [`CsvLedger`] is the flat-file sink: processed
//! URLs are appended to a `processed` CSV and removed from the source CSV, so
//! the next run picks up only what is left.

use crate::error::CoverGridError;
use crate::pipeline::input::{column_index, URL_COLUMN};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Ordered list of successfully placed source URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLedger {
    urls: Vec<String>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a placed URL.
    pub fn record(&mut self, url: impl Into<String>) {
        self.urls.push(url.into());
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

/// Bookkeeping collaborator that persists a finished ledger.
///
/// A failed flush is fatal for the whole ledger; sinks do not retry rows and
/// leave no partial bookkeeping behind.
pub trait LedgerSink {
    fn flush(&self, ledger: &RunLedger) -> Result<(), CoverGridError>;
}

/// CSV bookkeeping: append to `processed`, drop the rows from `source`.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    source: PathBuf,
    processed: PathBuf,
}

impl CsvLedger {
    /// `processed` defaults to `processed.csv` beside `source`.
    pub fn new(source: impl Into<PathBuf>, processed: Option<PathBuf>) -> Self {
        let source = source.into();
        let processed = processed.unwrap_or_else(|| source.with_file_name("processed.csv"));
        Self { source, processed }
    }

    pub fn processed_path(&self) -> &Path {
        &self.processed
    }

    fn append_processed(&self, ledger: &RunLedger) -> Result<(), CoverGridError> {
        let failed = |detail: String| CoverGridError::LedgerWriteFailed {
            path: self.processed.clone(),
            detail,
        };
        let is_new = std::fs::metadata(&self.processed)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.processed)
            .map_err(|e| failed(e.to_string()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer
                .write_record([URL_COLUMN])
                .map_err(|e| failed(e.to_string()))?;
        }
        for url in ledger.urls() {
            writer
                .write_record([url.as_str()])
                .map_err(|e| failed(e.to_string()))?;
        }
        writer.flush().map_err(|e| failed(e.to_string()))?;
        Ok(())
    }

    /// Undo an append so a failed flush leaves `processed` as it was.
    fn restore_processed(&self, previous_len: Option<u64>) {
        let restored = match previous_len {
            Some(len) => OpenOptions::new()
                .write(true)
                .open(&self.processed)
                .and_then(|f| f.set_len(len)),
            None => std::fs::remove_file(&self.processed),
        };
        if let Err(e) = restored {
            warn!(
                "Could not roll back {}: {}",
                self.processed.display(),
                e
            );
        }
    }

    fn rewrite_source(&self, ledger: &RunLedger) -> Result<usize, CoverGridError> {
        let failed = |detail: String| CoverGridError::LedgerWriteFailed {
            path: self.source.clone(),
            detail,
        };
        let done: HashSet<&str> = ledger.urls().iter().map(|u| u.trim()).collect();

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.source)
            .map_err(|e| failed(e.to_string()))?;
        let headers = reader.headers().map_err(|e| failed(e.to_string()))?.clone();
        let url_idx = column_index(&headers, URL_COLUMN)
            .ok_or_else(|| failed(format!("no '{URL_COLUMN}' column")))?;

        let mut tmp_name = self.source.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.source.with_file_name(tmp_name);

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&tmp_path)
            .map_err(|e| failed(e.to_string()))?;
        writer
            .write_record(&headers)
            .map_err(|e| failed(e.to_string()))?;

        let mut removed = 0usize;
        for record in reader.records() {
            let record = record.map_err(|e| failed(e.to_string()))?;
            if record.get(url_idx).is_some_and(|u| done.contains(u.trim())) {
                removed += 1;
                continue;
            }
            writer
                .write_record(&record)
                .map_err(|e| failed(e.to_string()))?;
        }
        writer.flush().map_err(|e| failed(e.to_string()))?;
        drop(writer);

        std::fs::rename(&tmp_path, &self.source).map_err(|e| failed(e.to_string()))?;
        Ok(removed)
    }
}

impl LedgerSink for CsvLedger {
    fn flush(&self, ledger: &RunLedger) -> Result<(), CoverGridError> {
        if ledger.is_empty() {
            return Ok(());
        }
        let previous_len = std::fs::metadata(&self.processed).ok().map(|m| m.len());
        let removed = match self
            .append_processed(ledger)
            .and_then(|()| self.rewrite_source(ledger))
        {
            Ok(removed) => removed,
            Err(e) => {
                self.restore_processed(previous_len);
                return Err(e);
            }
        };
        info!(
            "Moved {} processed URLs to {} ({} rows removed from {})",
            ledger.len(),
            self.processed.display(),
            removed,
            self.source.display()
        );
        Ok(())
    }
}
