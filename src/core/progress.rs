//! Run progress shared between the pipeline and its consumer.

use serde::{Deserialize, Serialize};

/// Snapshot of a run's progress counters.
///
/// The consumer reads this after a change notification; there is no payload
/// on the notification itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Total processing units (categories + mods) in the run
    pub total_items: usize,
    /// Units fully completed
    pub processed_items: usize,
    /// processed / total, 0.0 when the run is empty
    pub fraction: f64,
    /// Name of the item currently being processed
    pub current_name: String,
}

impl ProgressSnapshot {
    pub(crate) fn recompute(&mut self) {
        self.fraction = if self.total_items > 0 {
            self.processed_items as f64 / self.total_items as f64
        } else {
            0.0
        };
    }
}
