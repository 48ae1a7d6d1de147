//! Stage progress for atlas runs.
//!
//! The run reports through [`ProgressCallback`] without knowing whether a
//! terminal is attached. [`StageTracker`] turns a sequence of named stages
//! into `[n/total] label` messages on any callback.

use std::sync::Arc;

/// Sink for progress updates.
pub trait ProgressCallback: Send + Sync {
    /// Number of units the indicator counts up to.
    fn set_total(&self, total: u64);

    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Final message; no updates follow.
    fn finish(&self, msg: String);
}

/// Walks a [`ProgressCallback`] through numbered stages.
pub struct StageTracker {
    progress: Arc<dyn ProgressCallback>,
    total: u64,
    current: u64,
}

impl StageTracker {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressCallback>, total: u64) -> Self {
        progress.set_total(total);
        Self {
            progress,
            total,
            current: 0,
        }
    }

    /// Completes the running stage, if any, and starts `label`.
    pub fn begin(&mut self, label: &str) {
        if self.current > 0 {
            self.progress.inc(1);
        }
        self.current += 1;
        log::debug!("Stage {}/{}: {label}", self.current, self.total);
        self.progress
            .set_message(format!("[{}/{}] {label}", self.current, self.total));
    }

    /// 1-based index of the running stage; 0 before the first.
    #[must_use]
    pub const fn current(&self) -> u64 {
        self.current
    }

    /// Completes the last stage.
    pub fn finish(self, summary: String) {
        if self.current > 0 {
            self.progress.inc(1);
        }
        self.progress.finish(summary);
    }
}
