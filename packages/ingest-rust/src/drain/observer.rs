//! Observer hooks for the drain loop.
//!
//! Contains the [`DrainObserver`] trait, the [`TracingObserver`] used by the
//! binary, and [`CompositeObserver`] which fans out to several observers.
//! Observers see progress and failures but never change control flow.

use std::sync::Arc;

use graphbulk_core::EntityKey;
use tracing::{info, warn};

use super::DrainReport;
use crate::error::IngestError;

/// Coarse progress of one source, reported after a successful batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub source: String,
    pub processed: usize,
    pub total: usize,
    /// `floor(processed * 100 / total)`.
    pub percent: u8,
}

impl Progress {
    #[must_use]
    pub fn new(source: impl Into<String>, processed: usize, total: usize) -> Self {
        Self {
            source: source.into(),
            processed,
            total,
            percent: percent(processed, total),
        }
    }
}

/// Floor percentage of `processed` over `total`; an empty source is complete.
#[must_use]
pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = (processed as u128 * 100) / total as u128;
    u8::try_from(ratio.min(100)).unwrap_or(100)
}

/// A batch that failed without ending the run.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedBatch {
    pub source: String,
    /// 1-based batch number within the source.
    pub batch: usize,
    pub keys: Vec<EntityKey>,
    pub error: IngestError,
}

/// Observer for drain loop events.
///
/// Every method has an empty default so implementations only override what
/// they care about. Used as `Arc<dyn DrainObserver>`.
pub trait DrainObserver: Send + Sync {
    /// Called once before the first batch of a source.
    fn on_source_started(&self, _source: &str, _total: usize) {}

    /// Called after a successful batch raised the whole-percent progress.
    fn on_progress(&self, _progress: &Progress) {}

    /// Called once per batch that failed with a non-fatal error.
    fn on_batch_failed(&self, _failure: &FailedBatch) {}

    /// Called when a source reaches a terminal state.
    fn on_source_finished(&self, _report: &DrainReport) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl DrainObserver for NoopObserver {}

/// Observer that turns drain events into structured log lines.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl DrainObserver for TracingObserver {
    fn on_source_started(&self, source: &str, total: usize) {
        info!(source, total, "draining source");
    }

    fn on_progress(&self, progress: &Progress) {
        info!(
            source = %progress.source,
            processed = progress.processed,
            total = progress.total,
            percent = progress.percent,
            "progress"
        );
    }

    fn on_batch_failed(&self, failure: &FailedBatch) {
        warn!(
            source = %failure.source,
            batch = failure.batch,
            keys = failure.keys.len(),
            error = %failure.error,
            "batch failed; continuing with next batch"
        );
    }

    fn on_source_finished(&self, report: &DrainReport) {
        info!(
            source = %report.source,
            processed = report.processed,
            total = report.total,
            batches = report.batches,
            failed_batches = report.failed_batches,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "source finished"
        );
    }
}

/// Composite observer that fans out to multiple observers in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn DrainObserver>>,
}

impl CompositeObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn DrainObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn DrainObserver>) {
        self.observers.push(observer);
    }
}

impl DrainObserver for CompositeObserver {
    fn on_source_started(&self, source: &str, total: usize) {
        for o in &self.observers {
            o.on_source_started(source, total);
        }
    }

    fn on_progress(&self, progress: &Progress) {
        for o in &self.observers {
            o.on_progress(progress);
        }
    }

    fn on_batch_failed(&self, failure: &FailedBatch) {
        for o in &self.observers {
            o.on_batch_failed(failure);
        }
    }

    fn on_source_finished(&self, report: &DrainReport) {
        for o in &self.observers {
            o.on_source_finished(report);
        }
    }
}
