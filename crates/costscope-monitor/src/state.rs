//! Per-entity detector state carried across cycles.

use std::collections::HashSet;
use std::time::Instant;

/// State of one catalog entry inside one detector.
///
/// Created on first sighting and never removed, so a later disappearance
/// is observable. Bounded by catalog size.
#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    pub pids: HashSet<u32>,
    pub was_running: bool,
    pub was_foreground: bool,
    pub last_scan: Option<Instant>,
}

impl DetectorState {
    /// Seconds since the previous scan, or `None` on the first one
    pub fn elapsed_since_last(&self, now: Instant) -> Option<f64> {
        self.last_scan
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
    }
}
