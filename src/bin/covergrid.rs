//! CLI binary for covergrid.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GridConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use covergrid::{
    convert, convert_csv, GridConfig, ProgressCallback, RunOutput, RunProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the run, one log line per item.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} covers  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Fetching");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Laying out {total_items} covers…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, url: &str) {
        self.bar.set_message(truncate(url, 48));
    }

    fn on_item_placed(&self, index: usize, total: usize, page: usize) {
        self.bar.println(format!(
            "  {} {:>4}/{:<4} {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("page {}", page + 1)),
        ));
        self.bar.inc(1);
    }

    fn on_item_failed(&self, index: usize, total: usize, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>4}/{:<4} {}",
            red("✗"),
            index + 1,
            total,
            red(&truncate(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_items: usize, placed: usize) {
        self.bar.finish_and_clear();
        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} covers fetched", green("✔"), bold(&placed.to_string()));
        } else {
            eprintln!(
                "{} {}/{} covers fetched  ({} skipped)",
                if placed == 0 { red("✘") } else { cyan("⚠") },
                bold(&placed.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Lay out every unprinted row of a CSV (needs a "url" column)
  covergrid books.csv

  # Explicit output file, framed covers
  covergrid books.csv -o shelf.pdf --border

  # A few URLs without CSV bookkeeping
  covergrid --url https://img.example.com/a.jpg --url https://shop.example.com/book/42

  # Bigger cells, fewer per page
  covergrid books.csv --cell-width 45 --cell-height 64 --spacing 3

  # Hosts that refuse hot-linking
  covergrid books.csv --special-domain images.example.com \
      --user-agent "Mozilla/5.0" --referer https://shop.example.com/

CSV BOOKKEEPING:
  Rows whose status column equals --skip-status are ignored. After a run the
  placed URLs are appended to processed.csv (or --processed) and removed from
  the input CSV. If no rows are left the run exits successfully without
  writing a PDF. URLs given with --url are never written anywhere.

ENVIRONMENT VARIABLES:
  Every flag has a COVERGRID_* counterpart, e.g. COVERGRID_BORDER=true.
  RUST_LOG overrides the log filter.
"#;

/// Lay out book cover images from URLs on printable PDF pages.
#[derive(Parser, Debug)]
#[command(
    name = "covergrid",
    version,
    about = "Lay out book cover images from URLs on printable PDF pages",
    long_about = "Resolve each URL to a cover image (directly, or through a CSS selector on a \
product page), normalise it, and pack all covers into a dense grid on A4 pages.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// CSV file with a `url` column.
    #[arg(conflicts_with = "url", required_unless_present = "url")]
    input: Option<PathBuf>,

    /// Source URL; repeat for several. Skips CSV bookkeeping.
    #[arg(long)]
    url: Vec<String>,

    /// Output PDF path. Default: covers_<timestamp>.pdf.
    #[arg(short, long, env = "COVERGRID_OUTPUT")]
    output: Option<PathBuf>,

    /// Where processed URLs are appended. Default: processed.csv beside the input.
    #[arg(long, env = "COVERGRID_PROCESSED")]
    processed: Option<PathBuf>,

    /// Page width in mm.
    #[arg(long, env = "COVERGRID_PAGE_WIDTH", default_value_t = 210.0)]
    page_width: f64,

    /// Page height in mm.
    #[arg(long, env = "COVERGRID_PAGE_HEIGHT", default_value_t = 297.0)]
    page_height: f64,

    /// Cell width in mm.
    #[arg(long, env = "COVERGRID_CELL_WIDTH", default_value_t = 30.0)]
    cell_width: f64,

    /// Cell height in mm.
    #[arg(long, env = "COVERGRID_CELL_HEIGHT", default_value_t = 43.0)]
    cell_height: f64,

    /// Left (and right) margin in mm.
    #[arg(long, env = "COVERGRID_MARGIN_LEFT", default_value_t = 9.0)]
    margin_left: f64,

    /// Top (and bottom) margin in mm.
    #[arg(long, env = "COVERGRID_MARGIN_TOP", default_value_t = 9.0)]
    margin_top: f64,

    /// Gap between cells in mm.
    #[arg(long, env = "COVERGRID_SPACING", default_value_t = 2.0)]
    spacing: f64,

    /// CSS selector of the cover element on product pages.
    #[arg(long, env = "COVERGRID_SELECTOR", default_value = ".main-image-nosrc")]
    selector: String,

    /// Attribute of the selected element holding the image URL.
    #[arg(long, env = "COVERGRID_ATTRIBUTE", default_value = "data-src")]
    attribute: String,

    /// Host that needs the User-Agent/Referer headers; repeat or comma-separate.
    #[arg(long, env = "COVERGRID_SPECIAL_DOMAINS", value_delimiter = ',')]
    special_domain: Vec<String>,

    /// User-Agent sent to special domains.
    #[arg(long, env = "COVERGRID_USER_AGENT")]
    user_agent: Option<String>,

    /// Referer sent to special domains.
    #[arg(long, env = "COVERGRID_REFERER")]
    referer: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "COVERGRID_TIMEOUT", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Draw a 1 px gray frame around each cover.
    #[arg(long, env = "COVERGRID_BORDER")]
    border: bool,

    /// JPEG quality of normalised covers (1–100).
    #[arg(long, env = "COVERGRID_JPEG_QUALITY", default_value_t = 95,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// CSV column holding the row status.
    #[arg(long, env = "COVERGRID_STATUS_COLUMN", default_value = "status")]
    status_column: String,

    /// Skip CSV rows with this status.
    #[arg(long, env = "COVERGRID_SKIP_STATUS", default_value = "printed")]
    skip_status: String,

    /// Parent directory for scratch files.
    #[arg(long, env = "COVERGRID_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Keep the normalised covers after the run.
    #[arg(long, env = "COVERGRID_KEEP_SCRATCH")]
    keep_scratch: bool,

    /// Print the run result as JSON on stdout.
    #[arg(long, env = "COVERGRID_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "COVERGRID_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "COVERGRID_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "COVERGRID_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = match cli.input {
        Some(ref csv) => convert_csv(csv, &config)
            .await
            .with_context(|| format!("Run over {} failed", csv.display()))?,
        None => convert(&cli.url, &config).await.context("Run failed")?,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, show_progress);
    }

    Ok(())
}

/// Map CLI args to `GridConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GridConfig> {
    let mut builder = GridConfig::builder()
        .page_size(cli.page_width, cli.page_height)
        .cell_size(cli.cell_width, cli.cell_height)
        .margins(cli.margin_left, cli.margin_top)
        .spacing(cli.spacing)
        .selector(cli.selector.as_str())
        .image_attribute(cli.attribute.as_str())
        .special_domains(cli.special_domain.iter().map(String::as_str))
        .timeout_secs(cli.timeout)
        .border(cli.border)
        .jpeg_quality(cli.jpeg_quality)
        .keep_scratch(cli.keep_scratch)
        .status_column(cli.status_column.as_str())
        .skip_status(cli.skip_status.as_str());

    if let Some(ref ua) = cli.user_agent {
        builder = builder.user_agent(ua.as_str());
    }
    if let Some(ref referer) = cli.referer {
        builder = builder.referer(referer.as_str());
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(ref path) = cli.output {
        builder = builder.output_path(path);
    }
    if let Some(ref path) = cli.processed {
        builder = builder.processed_csv(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &RunOutput, progress_shown: bool) {
    let stats = &output.stats;
    let Some(ref pdf_path) = output.pdf_path else {
        eprintln!("{} nothing left to lay out", green("✔"));
        return;
    };
    if !progress_shown {
        for (url, err) in output.failures() {
            eprintln!("  {} {}  {}", red("✗"), url, dim(&err.to_string()));
        }
    }
    eprintln!(
        "{}  {}/{} covers  {} pages  {}ms  →  {}",
        if stats.failed_items == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.placed_items,
        stats.total_items,
        stats.pages,
        stats.total_duration_ms,
        bold(&pdf_path.display().to_string()),
    );
}
