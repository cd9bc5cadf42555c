//! Pipeline stages for URL-to-cover-grid conversion.
//!
//! Each submodule implements exactly one step so it can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ resolve ──▶ fetch ──▶ normalize ──▶ compose
//! (CSV/URLs) (HEAD/HTML) (GET)    (resize/JPEG)  (PDF grid)
//!                                  ▲             ▲
//!                                  └── geometry ─┘ (page layout, fixed per run)
//! ```
//!
//! 1. [`input`]    : read and number the source URLs, skipping printed rows
//! 2. [`resolve`]  : decide whether a URL is the image itself or a product
//!    page that points at it via a CSS selector
//! 3. [`fetch`]    : the only stage with network I/O, behind the
//!    [`fetch::Fetcher`] trait
//! 4. [`normalize`]: decode, flatten to RGB, resize to twice the cell size,
//!    optionally frame, re-encode; runs in `spawn_blocking`
//! 5. [`compose`]  : place each cover into the next free slot of the grid
//!    and write the PDF
//!
//! [`geometry`] is pure arithmetic shared by `normalize` and `compose`.

pub mod compose;
pub mod fetch;
pub mod geometry;
pub mod input;
pub mod normalize;
pub mod resolve;
