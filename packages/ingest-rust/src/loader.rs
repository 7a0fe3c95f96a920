//! Sequential file loader: drains sources one at a time, in order.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::dataset::SourceDescriptor;
use crate::drain::{DrainLoop, DrainReport};
use crate::error::IngestError;
use crate::traits::SourceReader;

/// Why a source did not finish cleanly.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceFailure {
    /// The file could not be read or parsed; nothing was sent for it.
    #[error("failed to load source: {0}")]
    Load(String),
    /// The drain loop rejected with its terminal error.
    #[error(transparent)]
    Drain(#[from] IngestError),
}

/// Terminal state of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source: SourceDescriptor,
    pub result: Result<DrainReport, SourceFailure>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderReport {
    /// One entry per source that was started, in processing order.
    pub outcomes: Vec<SourceOutcome>,
    /// Sources never started because a fatal error ended the run.
    pub skipped: Vec<SourceDescriptor>,
    /// The fatal error that ended the run early, if any.
    pub fatal: Option<IngestError>,
}

impl LoaderReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Process exit code for this report: 0 when every source reached a
    /// terminal state, 1 when the channel closed mid-run, 3 when the
    /// connection could not be established.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match &self.fatal {
            None => 0,
            Some(IngestError::Connection { .. }) => 3,
            Some(_) => 1,
        }
    }
}

/// Drives the drain loop over an ordered list of sources.
pub struct SequentialLoader {
    reader: Arc<dyn SourceReader>,
    drain: DrainLoop,
}

impl SequentialLoader {
    #[must_use]
    pub fn new(reader: Arc<dyn SourceReader>, drain: DrainLoop) -> Self {
        Self { reader, drain }
    }

    /// Drains each source to a terminal state before starting the next.
    ///
    /// Load failures and non-fatal drain failures are recorded and the run
    /// moves on; a fatal error records the remaining sources as skipped and
    /// stops.
    pub async fn run(&self, sources: Vec<SourceDescriptor>) -> LoaderReport {
        let mut report = LoaderReport::default();
        let mut queue: VecDeque<SourceDescriptor> = sources.into();
        info!(sources = queue.len(), "starting load");

        while let Some(source) = queue.pop_front() {
            let name = source.name();

            let records = match self.reader.read(&source).await {
                Ok(records) => records,
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!(source = %name, error = %reason, "skipping source that failed to load");
                    report.outcomes.push(SourceOutcome {
                        source,
                        result: Err(SourceFailure::Load(reason)),
                    });
                    continue;
                }
            };

            let result = self.drain.run(&name, records, source.offset).await;
            match result {
                Ok(drained) => report.outcomes.push(SourceOutcome {
                    source,
                    result: Ok(drained),
                }),
                Err(e) if e.is_fatal() => {
                    error!(source = %name, skipped = queue.len(), error = %e, "stopping load");
                    report.fatal = Some(e.clone());
                    report.outcomes.push(SourceOutcome {
                        source,
                        result: Err(e.into()),
                    });
                    report.skipped = queue.into();
                    return report;
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "source finished with a failed last batch");
                    report.outcomes.push(SourceOutcome {
                        source,
                        result: Err(e.into()),
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "done"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use graphbulk_core::{BulkPayload, BulkResult, EntityKey, Value};
    use parking_lot::Mutex;

    use super::*;
    use crate::bulk::BulkAccumulator;
    use crate::dataset::{EdgeRecord, EdgeSet};
    use crate::drain::{DrainConfig, NoopObserver};
    use crate::traits::BulkTransport;

    /// Serves in-memory edge sets; unknown paths fail to load.
    struct MapReader(HashMap<PathBuf, EdgeSet>);

    #[async_trait]
    impl SourceReader for MapReader {
        async fn read(&self, source: &SourceDescriptor) -> anyhow::Result<EdgeSet> {
            self.0
                .get(&source.file_path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such file: {}", source.name()))
        }
    }

    /// Records the first id of each bulk request and fails chosen calls.
    #[derive(Default)]
    struct Transport {
        first_ids: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail_on: Option<(usize, IngestError)>,
    }

    #[async_trait]
    impl BulkTransport for Transport {
        async fn send_bulk(&self, payload: BulkPayload) -> Result<BulkResult, IngestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.first_ids
                .lock()
                .push(payload.operations[0].id().to_string());
            match &self.fail_on {
                Some((n, e)) if *n == call => Err(e.clone()),
                _ => Ok(BulkResult::default()),
            }
        }
    }

    fn set(n: i64) -> EdgeSet {
        EdgeSet {
            records: (0..n)
                .map(|i| EdgeRecord {
                    key: EntityKey::Int(i),
                    source: Value::Int(1),
                    target: Value::Int(2),
                })
                .collect(),
        }
    }

    fn loader(transport: Arc<Transport>, files: &[(&str, i64)]) -> SequentialLoader {
        let reader = MapReader(
            files
                .iter()
                .map(|(path, n)| (PathBuf::from(path), set(*n)))
                .collect(),
        );
        let accumulator = Arc::new(BulkAccumulator::new("pokec", transport));
        let drain = DrainLoop::new(
            DrainConfig {
                batch_size: 2,
                ..DrainConfig::default()
            },
            accumulator,
            Arc::new(NoopObserver),
        );
        SequentialLoader::new(Arc::new(reader), drain)
    }

    #[tokio::test]
    async fn sources_run_in_order_with_their_offsets() {
        let transport = Arc::new(Transport::default());
        let loader = loader(transport.clone(), &[("a.json", 3), ("b.json", 2)]);

        let report = loader
            .run(vec![
                SourceDescriptor::new("a.json", 0),
                SourceDescriptor::new("b.json", 1000),
            ])
            .await;

        assert_eq!(*transport.first_ids.lock(), ["0", "2", "1000"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.exit_code(), 0);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn load_failure_is_reported_and_skipped() {
        let transport = Arc::new(Transport::default());
        let loader = loader(transport.clone(), &[("a.json", 1), ("c.json", 1)]);

        let report = loader
            .run(vec![
                SourceDescriptor::new("a.json", 0),
                SourceDescriptor::new("missing.json", 0),
                SourceDescriptor::new("c.json", 10),
            ])
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(matches!(
            &report.outcomes[1].result,
            Err(SourceFailure::Load(reason)) if reason.contains("missing.json")
        ));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(*transport.first_ids.lock(), ["0", "10"]);
    }

    #[tokio::test]
    async fn non_fatal_rejection_advances_to_next_source() {
        let transport = Arc::new(Transport {
            fail_on: Some((
                1,
                IngestError::Remote {
                    message: "nope".into(),
                },
            )),
            ..Transport::default()
        });
        let loader = loader(transport.clone(), &[("a.json", 1), ("b.json", 1)]);

        let report = loader
            .run(vec![
                SourceDescriptor::new("a.json", 0),
                SourceDescriptor::new("b.json", 5),
            ])
            .await;

        assert!(matches!(
            report.outcomes[0].result,
            Err(SourceFailure::Drain(IngestError::Remote { .. }))
        ));
        assert!(report.outcomes[1].result.is_ok());
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn fatal_error_skips_remaining_sources() {
        let transport = Arc::new(Transport {
            fail_on: Some((
                2,
                IngestError::ChannelClosed {
                    reason: "reset".into(),
                },
            )),
            ..Transport::default()
        });
        let loader = loader(transport.clone(), &[("a.json", 1), ("b.json", 1), ("c.json", 1)]);

        let report = loader
            .run(vec![
                SourceDescriptor::new("a.json", 0),
                SourceDescriptor::new("b.json", 0),
                SourceDescriptor::new("c.json", 0),
            ])
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.skipped, [SourceDescriptor::new("c.json", 0)]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_source_list_reports_success() {
        let transport = Arc::new(Transport::default());
        let report = loader(transport, &[]).run(Vec::new()).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn connection_failure_maps_to_exit_code_three() {
        let report = LoaderReport {
            fatal: Some(IngestError::Connection {
                endpoint: "ws://x".into(),
                reason: "refused".into(),
            }),
            ..LoaderReport::default()
        };
        assert_eq!(report.exit_code(), 3);
    }
}
