use serde::Serialize;
use std::fmt;

/// How a single entity's enrichment task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The entity no longer needs enrichment.
    Completed,
    /// Some fields were filled, some are still missing.
    Improved,
    /// Every source answered, none had anything new.
    Unchanged,
    /// Nothing changed and at least one source failed.
    Failed,
    /// The per-task timeout or the batch deadline expired.
    TimedOut,
    /// Stopped by shutdown before finishing.
    Cancelled,
}

impl TaskOutcome {
    pub fn classify(changed: bool, still_incomplete: bool, had_failure: bool) -> Self {
        match (changed, still_incomplete, had_failure) {
            (true, false, _) => TaskOutcome::Completed,
            (true, true, _) => TaskOutcome::Improved,
            (false, _, true) => TaskOutcome::Failed,
            (false, _, false) => TaskOutcome::Unchanged,
        }
    }
}

/// Summary of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub examined: usize,
    pub skipped_complete: usize,
    pub completed: usize,
    pub improved: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub persisted_artists: usize,
    pub persisted_songs: usize,
    pub elapsed_ms: u64,
}

impl EnrichmentReport {
    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Improved => self.improved += 1,
            TaskOutcome::Unchanged => self.unchanged += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::TimedOut => self.timed_out += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Number of entities that went through the source chain.
    pub fn attempted(&self) -> usize {
        self.completed
            + self.improved
            + self.unchanged
            + self.failed
            + self.timed_out
            + self.cancelled
    }

    pub fn persisted(&self) -> usize {
        self.persisted_artists + self.persisted_songs
    }
}

impl fmt::Display for EnrichmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} examined, {} already complete, {} completed, {} improved, {} unchanged, \
             {} failed, {} timed out, {} cancelled, {} persisted in {}ms",
            self.examined,
            self.skipped_complete,
            self.completed,
            self.improved,
            self.unchanged,
            self.failed,
            self.timed_out,
            self.cancelled,
            self.persisted(),
            self.elapsed_ms
        )
    }
}
