//! Batch drain loop: turns one source's ordered records into a bounded
//! sequence of bulk requests.
//!
//! Each iteration slices up to `batch_size` records off the front of the
//! cursor, pushes one operation per record into the accumulator and awaits
//! the flush before slicing again, so at most one bulk request is in flight.
//! A failed batch is reported and skipped; the source's outcome follows its
//! last batch. Fatal errors abort the source immediately.

pub mod observer;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use graphbulk_core::{ComponentKind, Endpoints, OpKind, WireOperation};
use tracing::{debug, error, info_span, Instrument};

pub use observer::{
    CompositeObserver, DrainObserver, FailedBatch, NoopObserver, Progress, TracingObserver,
};

use crate::bulk::BulkAccumulator;
use crate::dataset::{EdgeRecord, EdgeSet};
use crate::error::IngestError;

// ---------------------------------------------------------------------------
// DrainConfig
// ---------------------------------------------------------------------------

/// What the drain loop writes and how much per request.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Graph (remote index) the operations belong to.
    pub graph: String,
    /// Component kind every record becomes.
    pub kind: ComponentKind,
    /// Relation label attached to every record.
    pub label: String,
    /// Records per bulk request. Zero is treated as one.
    pub batch_size: usize,
    /// Whether records are persisted or destroyed.
    pub mode: OpKind,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            graph: "pokec".to_string(),
            kind: ComponentKind::Edge,
            label: "KNOWS".to_string(),
            batch_size: 500,
            mode: OpKind::Persist,
        }
    }
}

// ---------------------------------------------------------------------------
// DrainCursor
// ---------------------------------------------------------------------------

/// Position of the drain loop within one source.
///
/// `processed` counts attempted records, successful or not, so it reaches
/// `total` exactly once, when the last batch has been attempted.
#[derive(Debug)]
pub struct DrainCursor {
    remaining: VecDeque<EdgeRecord>,
    processed: usize,
    total: usize,
}

impl DrainCursor {
    #[must_use]
    pub fn new(records: Vec<EdgeRecord>) -> Self {
        let total = records.len();
        Self {
            remaining: records.into(),
            processed: 0,
            total,
        }
    }

    /// Removes up to `size` records from the front, preserving order.
    pub fn next_batch(&mut self, size: usize) -> Vec<EdgeRecord> {
        let take = size.max(1).min(self.remaining.len());
        self.remaining.drain(..take).collect()
    }

    /// Marks `count` records as attempted.
    pub fn advance(&mut self, count: usize) {
        self.processed = (self.processed + count).min(self.total);
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

// ---------------------------------------------------------------------------
// DrainReport
// ---------------------------------------------------------------------------

/// Summary of one drained source.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub source: String,
    pub total: usize,
    pub processed: usize,
    /// Flush attempts made.
    pub batches: usize,
    pub failed_batches: usize,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// DrainLoop
// ---------------------------------------------------------------------------

/// Drives one source through the accumulator.
pub struct DrainLoop {
    config: DrainConfig,
    accumulator: Arc<BulkAccumulator>,
    observer: Arc<dyn DrainObserver>,
}

impl DrainLoop {
    #[must_use]
    pub fn new(
        config: DrainConfig,
        accumulator: Arc<BulkAccumulator>,
        observer: Arc<dyn DrainObserver>,
    ) -> Self {
        Self {
            config,
            accumulator,
            observer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    /// Drains every record of `records`, adding `offset` to numeric keys.
    ///
    /// # Errors
    ///
    /// Returns the error of the last batch if that batch failed, or the first
    /// fatal error (`ChannelClosed`, `Connection`), which stops the source at
    /// once. An empty source succeeds without sending anything.
    pub async fn run(
        &self,
        source: &str,
        records: EdgeSet,
        offset: i64,
    ) -> Result<DrainReport, IngestError> {
        let started = Instant::now();
        let mut cursor = DrainCursor::new(records.records);
        let mut batches = 0;
        let mut failed_batches = 0;
        let mut reported_percent = 0u8;
        let mut last_error = None;

        self.observer.on_source_started(source, cursor.total());
        self.accumulator.open();

        while !cursor.is_exhausted() {
            let batch = cursor.next_batch(self.config.batch_size);
            batches += 1;
            for record in &batch {
                self.accumulator.push(self.to_operation(record, offset));
            }

            let result = self.flush_batch(source, batches, batch.len()).await;
            cursor.advance(batch.len());

            match result {
                Ok(()) => {
                    last_error = None;
                    let progress = Progress::new(source, cursor.processed(), cursor.total());
                    if progress.percent > reported_percent {
                        reported_percent = progress.percent;
                        self.observer.on_progress(&progress);
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(source, batch = batches, error = %e, "fatal error; aborting source");
                    self.accumulator.close();
                    return Err(e);
                }
                Err(e) => {
                    failed_batches += 1;
                    self.observer.on_batch_failed(&FailedBatch {
                        source: source.to_string(),
                        batch: batches,
                        keys: batch.into_iter().map(|r| r.key).collect(),
                        error: e.clone(),
                    });
                    last_error = Some(e);
                }
            }
        }
        self.accumulator.close();

        let report = DrainReport {
            source: source.to_string(),
            total: cursor.total(),
            processed: cursor.processed(),
            batches,
            failed_batches,
            elapsed: started.elapsed(),
        };
        self.observer.on_source_finished(&report);

        match last_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn to_operation(&self, record: &EdgeRecord, offset: i64) -> WireOperation {
        WireOperation {
            op: self.config.mode,
            target: self.config.kind,
            id: record.key.to_wire_id(offset),
            label: Some(self.config.label.clone()),
            properties: BTreeMap::new(),
            endpoints: Some(Endpoints {
                source: record.source.clone(),
                target: record.target.clone(),
            }),
            graph: self.config.graph.clone(),
        }
    }

    async fn flush_batch(&self, source: &str, batch: usize, ops: usize) -> Result<(), IngestError> {
        let span = info_span!(
            "bulk_flush",
            source,
            batch,
            ops,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.accumulator.flush().await;
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) if e.is_fatal() => "fatal",
                Err(_) => "error",
            };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            debug!(duration_ms, outcome, "flush complete");
            result.map(|_| ())
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
