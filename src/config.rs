//! Configuration types for a cover-grid run.
//!
//! Everything a run needs (physical layout, HTML lookup, HTTP policy, scratch
//! handling, output location) lives in one [`GridConfig`], built once via
//! [`GridConfigBuilder`] and passed by reference into every stage. No stage
//! reads the process environment; the CLI maps flags and `COVERGRID_*`
//! variables onto the builder.

use crate::error::CoverGridError;
use crate::pipeline::geometry::PageGeometry;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for one cover-grid run.
///
/// Built via [`GridConfig::builder()`] or using [`GridConfig::default()`].
/// All lengths are millimetres.
///
/// # Example
/// ```rust
/// use covergrid::GridConfig;
///
/// let config = GridConfig::builder()
///     .cell_size(30.0, 43.0)
///     .spacing(2.0)
///     .border(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.geometry().unwrap().items_per_page(), 36);
/// ```
#[derive(Clone)]
pub struct GridConfig {
    /// Page width. Default: 210 (A4).
    pub page_width_mm: f64,

    /// Page height. Default: 297 (A4).
    pub page_height_mm: f64,

    /// Width of one cover cell. Default: 30.
    pub cell_width_mm: f64,

    /// Height of one cover cell. Default: 43.
    pub cell_height_mm: f64,

    /// Left margin; the right margin mirrors it. Default: 9.
    pub margin_left_mm: f64,

    /// Top margin; the bottom margin mirrors it. Default: 9.
    pub margin_top_mm: f64,

    /// Gap between neighbouring cells, both axes. Default: 2.
    pub spacing_mm: f64,

    /// CSS selector locating the cover element on HTML pages.
    /// Default: `.main-image-nosrc`.
    pub selector: String,

    /// Attribute of the selected element holding the image location.
    /// Default: `data-src`.
    pub image_attribute: String,

    /// Header policy for probes and downloads.
    pub http: HttpPolicy,

    /// Draw a 1 px neutral-gray frame around every cover. Default: false.
    pub border: bool,

    /// JPEG quality of the normalised covers (1–100). Default: 95.
    pub jpeg_quality: u8,

    /// Parent directory for the per-run scratch directory.
    /// If None, the system temp directory is used.
    pub temp_dir: Option<PathBuf>,

    /// Keep the scratch directory of normalised covers after the run. Default: false.
    pub keep_scratch: bool,

    /// Output PDF path. If None, `covers_<timestamp>.pdf` in the working directory.
    pub output_path: Option<PathBuf>,

    /// Column of the source CSV holding the row status. Default: `status`.
    ///
    /// Ignored when the CSV has no such column.
    pub status_column: String,

    /// Rows whose status equals this value (trimmed, case-insensitive) are skipped.
    /// Default: `printed`.
    pub skip_status: String,

    /// Where processed URLs are appended. If None, `processed.csv` next to the source CSV.
    pub processed_csv: Option<PathBuf>,

    /// Optional per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            cell_width_mm: 30.0,
            cell_height_mm: 43.0,
            margin_left_mm: 9.0,
            margin_top_mm: 9.0,
            spacing_mm: 2.0,
            selector: ".main-image-nosrc".to_string(),
            image_attribute: "data-src".to_string(),
            http: HttpPolicy::default(),
            border: false,
            jpeg_quality: 95,
            temp_dir: None,
            keep_scratch: false,
            output_path: None,
            status_column: "status".to_string(),
            skip_status: "printed".to_string(),
            processed_csv: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridConfig")
            .field("page_width_mm", &self.page_width_mm)
            .field("page_height_mm", &self.page_height_mm)
            .field("cell_width_mm", &self.cell_width_mm)
            .field("cell_height_mm", &self.cell_height_mm)
            .field("margin_left_mm", &self.margin_left_mm)
            .field("margin_top_mm", &self.margin_top_mm)
            .field("spacing_mm", &self.spacing_mm)
            .field("selector", &self.selector)
            .field("image_attribute", &self.image_attribute)
            .field("http", &self.http)
            .field("border", &self.border)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("temp_dir", &self.temp_dir)
            .field("keep_scratch", &self.keep_scratch)
            .field("output_path", &self.output_path)
            .field("status_column", &self.status_column)
            .field("skip_status", &self.skip_status)
            .field("processed_csv", &self.processed_csv)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl GridConfig {
    /// Create a new builder for `GridConfig`.
    pub fn builder() -> GridConfigBuilder {
        GridConfigBuilder {
            config: Self::default(),
        }
    }

    /// Derive the page geometry, failing if no cell fits on the page.
    pub fn geometry(&self) -> Result<PageGeometry, CoverGridError> {
        PageGeometry::new(
            self.page_width_mm,
            self.page_height_mm,
            self.cell_width_mm,
            self.cell_height_mm,
            self.margin_left_mm,
            self.margin_top_mm,
            self.spacing_mm,
        )
    }

    /// The output path, falling back to a timestamped name.
    pub fn resolved_output_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "covers_{}.pdf",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ))
        })
    }

    /// Check every constraint `build()` enforces.
    ///
    /// `convert` calls this again because fields are public and may have
    /// been edited after `build()`.
    pub fn validate(&self) -> Result<(), CoverGridError> {
        let positive = [
            ("page width", self.page_width_mm),
            ("page height", self.page_height_mm),
            ("cell width", self.cell_width_mm),
            ("cell height", self.cell_height_mm),
        ];
        for (name, v) in positive {
            if !v.is_finite() || v <= 0.0 {
                return Err(CoverGridError::InvalidConfig(format!(
                    "{name} must be a positive length in mm, got {v}"
                )));
            }
        }
        let non_negative = [
            ("left margin", self.margin_left_mm),
            ("top margin", self.margin_top_mm),
            ("spacing", self.spacing_mm),
        ];
        for (name, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                return Err(CoverGridError::InvalidConfig(format!(
                    "{name} must be ≥ 0 mm, got {v}"
                )));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CoverGridError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                self.jpeg_quality
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(CoverGridError::InvalidConfig(
                "Request timeout must be ≥ 1s".into(),
            ));
        }
        if self.image_attribute.trim().is_empty() {
            return Err(CoverGridError::InvalidConfig(
                "Image attribute must not be empty".into(),
            ));
        }
        if self.selector.trim().is_empty()
            || kuchiki::Selectors::compile(&self.selector).is_err()
        {
            return Err(CoverGridError::InvalidConfig(format!(
                "Invalid CSS selector '{}'",
                self.selector
            )));
        }
        self.geometry().map(|_| ())
    }
}

/// Builder for [`GridConfig`].
#[derive(Debug)]
pub struct GridConfigBuilder {
    config: GridConfig,
}

impl GridConfigBuilder {
    pub fn page_size(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.config.page_width_mm = width_mm;
        self.config.page_height_mm = height_mm;
        self
    }

    pub fn cell_size(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.config.cell_width_mm = width_mm;
        self.config.cell_height_mm = height_mm;
        self
    }

    pub fn margins(mut self, left_mm: f64, top_mm: f64) -> Self {
        self.config.margin_left_mm = left_mm;
        self.config.margin_top_mm = top_mm;
        self
    }

    pub fn spacing(mut self, mm: f64) -> Self {
        self.config.spacing_mm = mm;
        self
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.config.selector = selector.into();
        self
    }

    pub fn image_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.config.image_attribute = attribute.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.http.user_agent = Some(ua.into());
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.config.http.referer = Some(referer.into());
        self
    }

    pub fn special_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.http.special_domains = domains
            .into_iter()
            .map(|d| {
                let d: String = d.into();
                d.trim().trim_start_matches('.').to_ascii_lowercase()
            })
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.http.timeout_secs = secs.max(1);
        self
    }

    pub fn border(mut self, v: bool) -> Self {
        self.config.border = v;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn keep_scratch(mut self, v: bool) -> Self {
        self.config.keep_scratch = v;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = Some(path.into());
        self
    }

    pub fn status_column(mut self, column: impl Into<String>) -> Self {
        self.config.status_column = column.into();
        self
    }

    pub fn skip_status(mut self, status: impl Into<String>) -> Self {
        self.config.skip_status = status.into();
        self
    }

    pub fn processed_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.processed_csv = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Fails fast on a grid that cannot hold a single cover, so a bad layout
    /// is reported before any network activity.
    pub fn build(self) -> Result<GridConfig, CoverGridError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Extra request headers for hosts that gate hot-linking.
///
/// The headers are attached to every probe and download whose host is one
/// of `special_domains` or a sub-domain of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPolicy {
    /// `User-Agent` sent to special domains.
    pub user_agent: Option<String>,
    /// `Referer` sent to special domains.
    pub referer: Option<String>,
    /// Lower-case host names, without leading dots.
    pub special_domains: Vec<String>,
    /// Per-request timeout in seconds. Default: 10.
    pub timeout_secs: u64,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            user_agent: None,
            referer: None,
            special_domains: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl HttpPolicy {
    /// Whether `url`'s host needs the special headers.
    pub fn is_special(&self, url: &str) -> bool {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.special_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Header name/value pairs to attach to a request for `url`.
    pub fn headers_for(&self, url: &str) -> Vec<(&'static str, String)> {
        if !self.is_special(url) {
            return Vec::new();
        }
        let mut headers = Vec::with_capacity(2);
        if let Some(ref ua) = self.user_agent {
            headers.push(("User-Agent", ua.clone()));
        }
        if let Some(ref referer) = self.referer {
            headers.push(("Referer", referer.clone()));
        }
        headers
    }
}
