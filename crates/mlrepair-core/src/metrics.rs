//! Global atomic counters for a repair run.
//!
//! Counters are bumped at the call site; [`Metrics::flush`] emits all of
//! them as one `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    masked_programs: AtomicU64,
    candidates: AtomicU64,
    candidates_rejected: AtomicU64,
    artifacts_built: AtomicU64,
    artifacts_failed: AtomicU64,
    validations_run: AtomicU64,
    validations_passed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            masked_programs: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            candidates_rejected: AtomicU64::new(0),
            artifacts_built: AtomicU64::new(0),
            artifacts_failed: AtomicU64::new(0),
            validations_run: AtomicU64::new(0),
            validations_passed: AtomicU64::new(0),
        }
    }

    pub fn add_masked(&self, n: u64) {
        self.masked_programs.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "masked_programs", n, "counter incremented");
    }

    pub fn add_candidates(&self, n: u64) {
        self.candidates.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "candidates", n, "counter incremented");
    }

    pub fn inc_rejected(&self) {
        self.candidates_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "candidates_rejected", "counter incremented");
    }

    pub fn inc_artifact_built(&self) {
        self.artifacts_built.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_built", "counter incremented");
    }

    pub fn inc_artifact_failed(&self) {
        self.artifacts_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_failed", "counter incremented");
    }

    pub fn inc_validation(&self, passed: bool) {
        self.validations_run.fetch_add(1, Ordering::Relaxed);
        if passed {
            self.validations_passed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "validations_run", passed, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            masked_programs = self.masked_programs(),
            candidates = self.candidates(),
            candidates_rejected = self.candidates_rejected(),
            artifacts_built = self.artifacts_built(),
            artifacts_failed = self.artifacts_failed(),
            validations_run = self.validations_run(),
            validations_passed = self.validations_passed(),
        );
    }

    pub fn masked_programs(&self) -> u64 {
        self.masked_programs.load(Ordering::Relaxed)
    }

    pub fn candidates(&self) -> u64 {
        self.candidates.load(Ordering::Relaxed)
    }

    pub fn candidates_rejected(&self) -> u64 {
        self.candidates_rejected.load(Ordering::Relaxed)
    }

    pub fn artifacts_built(&self) -> u64 {
        self.artifacts_built.load(Ordering::Relaxed)
    }

    pub fn artifacts_failed(&self) -> u64 {
        self.artifacts_failed.load(Ordering::Relaxed)
    }

    pub fn validations_run(&self) -> u64 {
        self.validations_run.load(Ordering::Relaxed)
    }

    pub fn validations_passed(&self) -> u64 {
        self.validations_passed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.masked_programs,
            &self.candidates,
            &self.candidates_rejected,
            &self.artifacts_built,
            &self.artifacts_failed,
            &self.validations_run,
            &self.validations_passed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.add_masked(3);
        m.add_candidates(6);
        m.inc_rejected();
        m.inc_validation(false);
        m.inc_validation(true);
        assert_eq!(m.masked_programs(), 3);
        assert_eq!(m.candidates(), 6);
        assert_eq!(m.candidates_rejected(), 1);
        assert_eq!(m.validations_run(), 2);
        assert_eq!(m.validations_passed(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.add_masked(1);
        m.inc_artifact_built();
        m.inc_artifact_failed();
        m.reset();
        assert_eq!(m.masked_programs(), 0);
        assert_eq!(m.artifacts_built(), 0);
        assert_eq!(m.artifacts_failed(), 0);
    }
}
