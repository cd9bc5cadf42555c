//! Result types of a run.

use crate::error::ItemError;
use crate::ledger::RunLedger;
use crate::pipeline::compose::Placement;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one source URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// 0-based position in the source list.
    pub index: usize,
    pub source_url: String,
    pub result: Result<Placement, ItemError>,
}

impl ItemOutcome {
    pub fn is_placed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_items: usize,
    pub placed_items: usize,
    pub failed_items: usize,
    pub pages: usize,
    pub total_duration_ms: u64,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// The written PDF; None when a CSV run found nothing left to lay out.
    pub pdf_path: Option<PathBuf>,
    /// One entry per source item, in source order.
    pub outcomes: Vec<ItemOutcome>,
    /// Placed source URLs, in placement order.
    pub ledger: RunLedger,
    pub stats: RunStats,
}

impl RunOutput {
    /// A run that had nothing to do.
    pub fn empty() -> Self {
        Self {
            pdf_path: None,
            outcomes: Vec::new(),
            ledger: RunLedger::new(),
            stats: RunStats::default(),
        }
    }

    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ItemError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.source_url.as_str(), e)))
    }
}
