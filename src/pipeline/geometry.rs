//! Page geometry: how many covers fit on a page and where each one goes.
//!
//! Everything is computed in millimetres from the configuration. The only
//! unit conversion is to PostScript points (1/72 in), used both for the PDF
//! media box and as the "pixel-equivalent" size of a cell when normalising
//! images.

use crate::error::CoverGridError;
use serde::{Deserialize, Serialize};

/// Millimetres → PostScript points.
pub const MM_TO_PT: f64 = 72.0 / 25.4;

/// Covers are rendered at this multiple of their pixel-equivalent size so the
/// PDF viewer downsamples rather than upsamples when printing.
pub const OVERSAMPLE: u32 = 2;

/// Absorbs float noise in `usable / pitch` when the fit is exact.
const FIT_EPSILON: f64 = 1e-9;

/// Immutable page layout derived once per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    page_width_mm: f64,
    page_height_mm: f64,
    cell_width_mm: f64,
    cell_height_mm: f64,
    margin_left_mm: f64,
    margin_top_mm: f64,
    spacing_mm: f64,
    columns: usize,
    rows: usize,
}

/// Where the i-th placed cover lands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSlot {
    /// 0-based page.
    pub page: usize,
    pub col: usize,
    pub row: usize,
    /// Left edge, from the page's left side.
    pub x_mm: f64,
    /// Top edge, from the page's top side.
    pub y_mm: f64,
}

impl PageGeometry {
    /// Derive the grid for the given physical dimensions.
    ///
    /// # Errors
    /// [`CoverGridError::ZeroCapacity`] when not even one column or row fits.
    pub fn new(
        page_width_mm: f64,
        page_height_mm: f64,
        cell_width_mm: f64,
        cell_height_mm: f64,
        margin_left_mm: f64,
        margin_top_mm: f64,
        spacing_mm: f64,
    ) -> Result<Self, CoverGridError> {
        let columns = fit("column", page_width_mm - 2.0 * margin_left_mm, cell_width_mm + spacing_mm)?;
        let rows = fit("row", page_height_mm - 2.0 * margin_top_mm, cell_height_mm + spacing_mm)?;

        Ok(Self {
            page_width_mm,
            page_height_mm,
            cell_width_mm,
            cell_height_mm,
            margin_left_mm,
            margin_top_mm,
            spacing_mm,
            columns,
            rows,
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn items_per_page(&self) -> usize {
        self.columns * self.rows
    }

    pub fn page_size_mm(&self) -> (f64, f64) {
        (self.page_width_mm, self.page_height_mm)
    }

    pub fn cell_size_mm(&self) -> (f64, f64) {
        (self.cell_width_mm, self.cell_height_mm)
    }

    /// Page size in PDF points.
    pub fn page_size_pt(&self) -> (f64, f64) {
        (self.page_width_mm * MM_TO_PT, self.page_height_mm * MM_TO_PT)
    }

    /// Pixel-equivalent cell size: the cell in points, truncated.
    pub fn cell_pixels(&self) -> (u32, u32) {
        (to_whole_points(self.cell_width_mm), to_whole_points(self.cell_height_mm))
    }

    /// Pixel size every cover is resampled to before bordering.
    pub fn target_pixels(&self) -> (u32, u32) {
        let (w, h) = self.cell_pixels();
        (w * OVERSAMPLE, h * OVERSAMPLE)
    }

    /// Number of pages needed for `placed` covers.
    pub fn pages_for(&self, placed: usize) -> usize {
        placed.div_ceil(self.items_per_page())
    }

    /// Position of the `slot`-th placed cover (0-based, page-major,
    /// left-to-right then top-to-bottom).
    pub fn slot(&self, slot: usize) -> GridSlot {
        let per_page = self.items_per_page();
        let page = slot / per_page;
        let index = slot % per_page;
        let col = index % self.columns;
        let row = index / self.columns;
        GridSlot {
            page,
            col,
            row,
            x_mm: self.margin_left_mm + col as f64 * (self.cell_width_mm + self.spacing_mm),
            y_mm: self.margin_top_mm + row as f64 * (self.cell_height_mm + self.spacing_mm),
        }
    }
}

fn fit(axis: &'static str, usable_mm: f64, pitch_mm: f64) -> Result<usize, CoverGridError> {
    let count = if usable_mm > 0.0 && pitch_mm > 0.0 {
        (usable_mm / pitch_mm + FIT_EPSILON).floor() as usize
    } else {
        0
    };
    if count == 0 {
        return Err(CoverGridError::ZeroCapacity {
            axis,
            usable_mm,
            pitch_mm,
        });
    }
    Ok(count)
}

fn to_whole_points(mm: f64) -> u32 {
    ((mm * MM_TO_PT).floor() as u32).max(1)
}
