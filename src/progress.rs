//! Progress-callback trait for per-item run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::GridConfigBuilder::progress_callback`] to follow a run
//! item by item. The CLI drives an `indicatif` bar from it; library callers
//! can forward events anywhere without the pipeline knowing how.
//!
//! # Example
//!
//! ```rust
//! use covergrid::{GridConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     placed: AtomicUsize,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_item_placed(&self, index: usize, total: usize, page: usize) {
//!         self.placed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("item {}/{} on page {}", index + 1, total, page + 1);
//!     }
//! }
//!
//! let config = GridConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { placed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the run loop as it processes each source item.
///
/// Items are processed sequentially, so events arrive in source order. All
/// methods default to no-ops.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before the first item.
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called before an item is resolved.
    ///
    /// # Arguments
    /// * `index`: 0-based position in the source list
    fn on_item_start(&self, index: usize, total_items: usize, url: &str) {
        let _ = (index, total_items, url);
    }

    /// Called after an item is placed on `page` (0-based).
    fn on_item_placed(&self, index: usize, total_items: usize, page: usize) {
        let _ = (index, total_items, page);
    }

    /// Called when an item is dropped.
    fn on_item_failed(&self, index: usize, total_items: usize, error: &str) {
        let _ = (index, total_items, error);
    }

    /// Called once after every item was attempted, before the PDF is written.
    fn on_run_complete(&self, total_items: usize, placed: usize) {
        let _ = (total_items, placed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GridConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
