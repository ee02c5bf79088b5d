use std::time::Instant;

use serde::Serialize;

/// Counters for one command run.
///
/// `hits` is the match count for searches and the updated-row count for
/// updates. Values are folded, never mutated in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub scanned: u64,
    pub hits: u64,
    pub elapsed_ms: u64,
}

impl RunStats {
    #[must_use]
    pub fn record(self, hit: bool) -> Self {
        Self {
            scanned: self.scanned + 1,
            hits: self.hits + u64::from(hit),
            ..self
        }
    }

    #[must_use]
    pub fn finish(self, started: Instant) -> Self {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Self { elapsed_ms, ..self }
    }

    /// Rows per second, or `None` when the run took under a millisecond.
    pub fn throughput(&self) -> Option<f64> {
        (self.elapsed_ms > 0).then(|| self.scanned as f64 * 1000.0 / self.elapsed_ms as f64)
    }
}
