//! Error types for the covergrid library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CoverGridError`]: **Fatal**: the run cannot proceed at all
//!   (invalid geometry, unreadable source CSV, PDF could not be written).
//!   Returned as `Err(CoverGridError)` from the top-level `convert*`
//!   functions, always before or after the item loop, never from inside it.
//!
//! * [`ItemError`]: **Non-fatal**: a single source URL failed to resolve,
//!   download or decode. Stored inside [`crate::output::ItemOutcome`] so the
//!   caller sees exactly which URLs are missing from the ledger and why.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the covergrid library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::output::ItemOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CoverGridError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cell plus spacing does not fit the usable page area on one axis.
    #[error(
        "No {axis} fits on the page: usable {usable_mm:.2}mm < cell + spacing {pitch_mm:.2}mm\n\
Reduce the cell size, spacing or margins."
    )]
    ZeroCapacity {
        axis: &'static str,
        usable_mm: f64,
        pitch_mm: f64,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Source CSV was not found at the given path.
    #[error("Source CSV not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Source CSV could not be parsed.
    #[error("Failed to read source CSV '{path}': {detail}")]
    SourceUnreadable { path: PathBuf, detail: String },

    /// A required column is absent from the source CSV header.
    #[error("Source CSV '{path}' must have a '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    /// Nothing left to process after filtering.
    #[error("No source URLs to process")]
    EmptyInput,

    // ── Run errors ────────────────────────────────────────────────────────
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Every item failed; there is nothing to put in a document.
    #[error("All {total} items failed; no PDF written.\nFirst error: {first_error}")]
    NothingPlaced { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the scratch directory for per-item images.
    #[error("Failed to create scratch directory: {source}")]
    ScratchDir {
        #[source]
        source: std::io::Error,
    },

    /// The PDF document could not be assembled or written.
    #[error("Failed to write PDF '{path}': {detail}")]
    PdfWriteFailed { path: PathBuf, detail: String },

    /// A ledger sink failed to persist the processed URLs.
    #[error("Failed to update ledger '{path}': {detail}")]
    LedgerWriteFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single source URL.
///
/// The run continues with the next item; the failed URL is simply absent
/// from the [`crate::ledger::RunLedger`].
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Connection, DNS or TLS failure.
    #[error("request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// Request exceeded the configured timeout.
    #[error("request to '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Server answered with a non-2xx status.
    #[error("'{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The page has no element matching the selector.
    #[error("no element matching '{selector}' at '{url}'")]
    SelectorNotFound { url: String, selector: String },

    /// The selected element has no usable image attribute.
    #[error("element '{selector}' at '{url}' has no '{attribute}' attribute")]
    AttributeMissing {
        url: String,
        selector: String,
        attribute: String,
    },

    /// Downloaded bytes are not a decodable image.
    #[error("cannot decode image from '{url}': {detail}")]
    Decode { url: String, detail: String },

    /// Normalised image could not be encoded or written to scratch.
    #[error("cannot write normalised image '{path}': {detail}")]
    Encode { path: PathBuf, detail: String },

    /// The compositor rejected the image.
    #[error("cannot place image from '{url}': {detail}")]
    Placement { url: String, detail: String },

    /// The blocking image worker died (panicked or was cancelled).
    #[error("image worker for '{url}' failed: {detail}")]
    Worker { url: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_display() {
        let e = CoverGridError::ZeroCapacity {
            axis: "column",
            usable_mm: 192.0,
            pitch_mm: 250.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("column"), "got: {msg}");
        assert!(msg.contains("192.00mm"), "got: {msg}");
    }

    #[test]
    fn missing_column_display() {
        let e = CoverGridError::MissingColumn {
            path: PathBuf::from("books.csv"),
            column: "url".into(),
        };
        assert!(e.to_string().contains("'url' column"));
    }

    #[test]
    fn http_status_display() {
        let e = ItemError::HttpStatus {
            url: "https://example.com/a.jpg".into(),
            status: 404,
        };
        assert!(e.to_string().contains("HTTP 404"));
    }

    #[test]
    fn item_error_serialises() {
        let e = ItemError::Timeout {
            url: "https://example.com".into(),
            secs: 10,
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Timeout"));
    }
}
