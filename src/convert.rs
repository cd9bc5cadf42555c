//! Run entry points: source URLs in, PDF grid and ledger out.
//!
//! Items are processed strictly one after another: resolve, download,
//! normalise, place. A failing item is logged, recorded as an
//! [`ItemOutcome`] with its [`ItemError`], and skipped without consuming a
//! grid slot. Only configuration, input, and output problems abort a run, and
//! the PDF is written only after every item has been attempted.

use crate::config::GridConfig;
use crate::error::{CoverGridError, ItemError};
use crate::ledger::{CsvLedger, LedgerSink, RunLedger};
use crate::output::{ItemOutcome, RunOutput, RunStats};
use crate::pipeline::compose::GridDocument;
use crate::pipeline::fetch::{Fetcher, HttpFetcher};
use crate::pipeline::input::{self, SourceItem};
use crate::pipeline::normalize::{self, NormalizeOptions, NormalizedImage};
use crate::pipeline::resolve;
use std::path::Path;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Turn a list of source URLs into a PDF grid.
///
/// Blank entries are ignored. Uses a real HTTP client built from
/// `config.http`.
///
/// # Returns
/// `Ok(RunOutput)` when at least one cover was placed, even if others
/// failed (check `output.stats.failed_items`).
///
/// # Errors
/// Returns `Err(CoverGridError)` only for fatal errors:
/// - invalid configuration, including a grid with no capacity
/// - empty source list
/// - every item failed
/// - the PDF could not be written
pub async fn convert<I, S>(urls: I, config: &GridConfig) -> Result<RunOutput, CoverGridError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items = input::sources_from_urls(urls);
    let fetcher = HttpFetcher::new(&config.http)?;
    convert_items(&items, config, &fetcher).await
}

/// Read the source list from a CSV file, run, and update the CSV ledger.
///
/// On success the placed URLs are appended to the processed CSV and removed
/// from `csv_path`. Fatal input errors (missing file, missing `url` column)
/// surface before any network activity, and nothing is written.
///
/// A CSV whose rows are all already printed is not an error: the run returns
/// [`RunOutput::empty`] without writing a PDF or touching either CSV.
pub async fn convert_csv(
    csv_path: impl AsRef<Path>,
    config: &GridConfig,
) -> Result<RunOutput, CoverGridError> {
    config.validate()?;
    let fetcher = HttpFetcher::new(&config.http)?;
    convert_csv_with(csv_path, config, &fetcher).await
}

/// [`convert_csv`] with a caller-supplied transport.
pub async fn convert_csv_with(
    csv_path: impl AsRef<Path>,
    config: &GridConfig,
    fetcher: &dyn Fetcher,
) -> Result<RunOutput, CoverGridError> {
    let csv_path = csv_path.as_ref();
    config.validate()?;
    let items = input::read_source_csv(csv_path, &config.status_column, &config.skip_status)?;
    if items.is_empty() {
        info!("Nothing left to lay out in {}", csv_path.display());
        return Ok(RunOutput::empty());
    }

    let output = convert_items(&items, config, fetcher).await?;

    CsvLedger::new(csv_path, config.processed_csv.clone()).flush(&output.ledger)?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync<I, S>(urls: I, config: &GridConfig) -> Result<RunOutput, CoverGridError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| CoverGridError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(urls, config))
}

/// Core run loop over already-numbered items.
pub async fn convert_items(
    items: &[SourceItem],
    config: &GridConfig,
    fetcher: &dyn Fetcher,
) -> Result<RunOutput, CoverGridError> {
    let total_start = Instant::now();

    // ── Step 1: Validate layout before touching the network ──────────────
    config.validate()?;
    let geometry = config.geometry()?;
    if items.is_empty() {
        return Err(CoverGridError::EmptyInput);
    }
    info!(
        "Laying out {} items, {}×{} per page ({:.0}×{:.0}mm cells)",
        items.len(),
        geometry.columns(),
        geometry.rows(),
        config.cell_width_mm,
        config.cell_height_mm
    );

    // ── Step 2: Scratch directory for normalised covers ──────────────────
    let scratch = create_scratch(config)?;
    debug!("Scratch directory: {}", scratch.path().display());

    let options = NormalizeOptions {
        target: geometry.target_pixels(),
        border: config.border,
        jpeg_quality: config.jpeg_quality,
    };

    // ── Step 3: Resolve, download, normalise and place each item ─────────
    let total = items.len();
    let mut grid = GridDocument::new(geometry);
    let mut ledger = RunLedger::new();
    let mut outcomes = Vec::with_capacity(total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    for item in items {
        if let Some(ref cb) = config.progress_callback {
            cb.on_item_start(item.index, total, &item.url);
        }

        let result = match prepare_item(fetcher, item, config, options, scratch.path()).await {
            Ok(image) => grid
                .place_file(&item.url, &image)
                .map_err(|detail| ItemError::Placement {
                    url: item.url.clone(),
                    detail,
                }),
            Err(e) => Err(e),
        };

        match &result {
            Ok(placement) => {
                ledger.record(item.url.as_str());
                debug!(
                    "processed {}/{} → page {} col {} row {}",
                    item.index + 1,
                    total,
                    placement.page + 1,
                    placement.col,
                    placement.row
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_placed(item.index, total, placement.page);
                }
            }
            Err(e) => {
                warn!("Skipping {}: {}", item.url, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_failed(item.index, total, &e.to_string());
                }
            }
        }

        outcomes.push(ItemOutcome {
            index: item.index,
            source_url: item.url.clone(),
            result,
        });
    }

    let placed = grid.placed();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, placed);
    }

    if placed == 0 {
        let first_error = outcomes
            .iter()
            .find_map(|o| o.result.as_ref().err())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        finish_scratch(scratch, config.keep_scratch);
        return Err(CoverGridError::NothingPlaced { total, first_error });
    }

    // ── Step 4: Write the document ───────────────────────────────────────
    let pdf_path = config.resolved_output_path();
    let pages = grid
        .save(&pdf_path)
        .map_err(|detail| CoverGridError::PdfWriteFailed {
            path: pdf_path.clone(),
            detail,
        })?;

    finish_scratch(scratch, config.keep_scratch);

    let stats = RunStats {
        total_items: total,
        placed_items: placed,
        failed_items: total - placed,
        pages,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {}/{} covers on {} pages, {}ms total",
        stats.placed_items, stats.total_items, stats.pages, stats.total_duration_ms
    );

    Ok(RunOutput {
        pdf_path: Some(pdf_path),
        outcomes,
        ledger,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve and normalise one item into its scratch file.
async fn prepare_item(
    fetcher: &dyn Fetcher,
    item: &SourceItem,
    config: &GridConfig,
    options: NormalizeOptions,
    scratch: &Path,
) -> Result<NormalizedImage, ItemError> {
    let resolved =
        resolve::resolve(fetcher, &item.url, &config.selector, &config.image_attribute).await?;
    let dest = scratch.join(item.scratch_name());
    normalize::fetch_and_normalize(fetcher, &resolved.image_url, &dest, options).await
}

fn create_scratch(config: &GridConfig) -> Result<TempDir, CoverGridError> {
    let scratch = match config.temp_dir {
        Some(ref parent) => {
            std::fs::create_dir_all(parent)
                .map_err(|source| CoverGridError::ScratchDir { source })?;
            tempfile::Builder::new()
                .prefix("covergrid-")
                .tempdir_in(parent)
        }
        None => tempfile::Builder::new().prefix("covergrid-").tempdir(),
    };
    scratch.map_err(|source| CoverGridError::ScratchDir { source })
}

fn finish_scratch(scratch: TempDir, keep: bool) {
    if keep {
        let path = scratch.keep();
        info!("Kept normalised covers in {}", path.display());
    } else if let Err(e) = scratch.close() {
        warn!("Could not remove scratch directory: {}", e);
    } else {
        debug!("Removed scratch directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_input_is_fatal() {
        let config = GridConfig::default();
        let fetcher = HttpFetcher::new(&config.http).unwrap();
        let err = convert_items(&[], &config, &fetcher).await.unwrap_err();
        assert!(matches!(err, CoverGridError::EmptyInput));
    }

    #[tokio::test]
    async fn bad_geometry_fails_before_network() {
        let mut config = GridConfig::default();
        config.cell_height_mm = 400.0;
        let fetcher = HttpFetcher::new(&config.http).unwrap();
        let items = input::sources_from_urls(["http://127.0.0.1:9/never-contacted"]);
        let err = convert_items(&items, &config, &fetcher).await.unwrap_err();
        assert!(matches!(err, CoverGridError::ZeroCapacity { axis: "row", .. }));
    }

    #[test]
    fn scratch_is_created_under_configured_parent() {
        let parent = tempfile::tempdir().unwrap();
        let config = GridConfig::builder()
            .temp_dir(parent.path().join("work"))
            .build()
            .unwrap();
        let scratch = create_scratch(&config).unwrap();
        assert!(scratch.path().starts_with(parent.path().join("work")));
        let path = scratch.path().to_path_buf();
        finish_scratch(scratch, false);
        assert!(!path.exists());
    }

    #[test]
    fn kept_scratch_survives() {
        let parent = tempfile::tempdir().unwrap();
        let config = GridConfig::builder().temp_dir(parent.path()).build().unwrap();
        let scratch = create_scratch(&config).unwrap();
        let path = scratch.path().to_path_buf();
        finish_scratch(scratch, true);
        assert!(path.exists());
    }
}
