//! # covergrid
//!
//! Lay out book cover images from a list of URLs onto printable A4 pages.
//!
//! A source URL is either the image itself or a product page whose HTML holds
//! the cover link in an attribute of a CSS-selected element. Each cover is
//! downloaded, flattened to RGB, resized to twice its printed cell size, and
//! packed row-major into a fixed grid. Failing URLs are skipped without
//! leaving a hole, and the URLs that did make it into the PDF are returned as
//! a run ledger for bookkeeping.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URLs / CSV
//!  │
//!  ├─ 1. Input      number the sources, skip rows already printed
//!  ├─ 2. Resolve    HEAD probe, else scrape the product page
//!  ├─ 3. Fetch      download the image bytes
//!  ├─ 4. Normalize  RGB, 2× Lanczos resize, optional border, JPEG (spawn_blocking)
//!  ├─ 5. Compose    dense-pack into the page grid, write the PDF
//!  └─ 6. Ledger     placed URLs, optionally moved to processed.csv
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use covergrid::{convert, GridConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GridConfig::builder()
//!         .border(true)
//!         .output_path("covers.pdf")
//!         .build()?;
//!     let output = convert(
//!         ["https://images.example.com/dune.jpg", "https://shop.example.com/book/42"],
//!         &config,
//!     )
//!     .await?;
//!     eprintln!(
//!         "{} of {} covers on {} pages",
//!         output.stats.placed_items, output.stats.total_items, output.stats.pages
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `covergrid` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! covergrid = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GridConfig, GridConfigBuilder, HttpPolicy};
pub use convert::{convert, convert_csv, convert_csv_with, convert_items, convert_sync};
pub use error::{CoverGridError, ItemError};
pub use ledger::{CsvLedger, LedgerSink, RunLedger};
pub use output::{ItemOutcome, RunOutput, RunStats};
pub use pipeline::compose::Placement;
pub use pipeline::fetch::{Fetcher, HttpFetcher};
pub use pipeline::geometry::PageGeometry;
pub use pipeline::input::SourceItem;
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
