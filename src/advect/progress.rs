//! Progress reporting and per-rank counters.

/// Receives `(completed, total)` whenever this rank's view of the global
/// live-curve count changes.
pub trait ProgressSink {
    fn update_progress(&mut self, completed: u64, total: u64);
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update_progress(&mut self, _completed: u64, _total: u64) {}
}

impl<F: FnMut(u64, u64)> ProgressSink for F {
    fn update_progress(&mut self, completed: u64, total: u64) {
        self(completed, total)
    }
}

/// Per-rank counters of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdvectStats {
    /// Calls into the external advection step.
    pub advanced: u64,
    /// Curves that terminated on this rank.
    pub terminated: u64,
    /// Curve copies sent to other ranks.
    pub sent: u64,
    /// Curve copies received from other ranks.
    pub received: u64,
    /// Received copies accepted here.
    pub accepted: u64,
    /// Received copies dropped here (NOT_USED).
    pub rejected: u64,
    /// Curves every candidate owner declined, or that had none.
    pub lost: u64,
    /// Offers repeated to the next candidate owner after a refusal.
    pub reoffered: u64,
    /// TERMINATE_COUNT messages sent.
    pub count_messages: u64,
}
