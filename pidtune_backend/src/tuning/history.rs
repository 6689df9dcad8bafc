use serde::{Deserialize, Serialize};

use super::metrics::PerformanceMetrics;
use super::GainSet;

/// One measured iteration: the gains that were simulated and what they did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub parameters: GainSet,
    pub metrics: PerformanceMetrics,
}

/// Append-only ledger of a tuning run. Entry 0 is the baseline.
///
/// The only in-place change allowed after an append is raising the
/// `early_stop` flag on the newest entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn baseline(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Flags the newest entry as the one that met the goal.
    pub(crate) fn mark_latest_early_stop(&mut self) {
        if let Some(entry) = self.entries.last_mut() {
            entry.metrics.early_stop = true;
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
