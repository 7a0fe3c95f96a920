//! `graphbulk`: bulk-load keyed edge files into a remote graph store.
//!
//! ```text
//! graphbulk --graph pokec \
//!     --source ./data/edges-aa.json:0 \
//!     --source ./data/edges-ab.json:2000000
//! ```
//!
//! Exit codes: 0 all sources processed, 1 channel closed mid-run, 2 invalid
//! arguments, 3 connection failed, 130 interrupted.

use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use graphbulk_core::{ComponentKind, OpKind, WireFormat};
use graphbulk_ingest::logging::{self, LogFormat};
use graphbulk_ingest::network;
use graphbulk_ingest::{
    BulkAccumulator, CorrelationRouter, DrainConfig, DrainLoop, JsonEdgeReader, LoaderReport,
    NetworkConfig, RpcConfig, SequentialLoader, SourceDescriptor, TracingObserver,
};
use tracing::{error, info, warn};

const EXIT_CONNECTION_FAILED: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "graphbulk", version, about = "Bulk-load keyed edge files into a graph store")]
struct Args {
    /// WebSocket endpoint of the graph store.
    #[arg(long, env = "GRAPHBULK_ENDPOINT", default_value = "ws://127.0.0.1:8007")]
    endpoint: String,

    /// Graph (remote index) to write into.
    #[arg(long, env = "GRAPHBULK_GRAPH")]
    graph: String,

    /// Component kind of every record: v, e, or g.
    #[arg(long, default_value = "e")]
    kind: ComponentKind,

    /// Relation label attached to every record.
    #[arg(long, default_value = "KNOWS")]
    label: String,

    /// Records per bulk request.
    #[arg(long, env = "GRAPHBULK_BATCH_SIZE", default_value = "500")]
    batch_size: NonZeroUsize,

    /// persist or destroy.
    #[arg(long, default_value = "persist")]
    mode: OpKind,

    /// Request encoding: json (text frames) or msgpack (binary frames).
    #[arg(long, default_value = "json")]
    wire_format: WireFormat,

    /// Per-request deadline in seconds; 0 waits forever.
    #[arg(long, default_value_t = 30)]
    call_timeout_secs: u64,

    /// Handshake deadline in seconds.
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Input file with an optional id offset, as PATH[:OFFSET]. Repeatable;
    /// sources are loaded in the order given.
    #[arg(long = "source", value_name = "PATH[:OFFSET]")]
    sources: Vec<SourceDescriptor>,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            endpoint: self.endpoint.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            call_timeout: (self.call_timeout_secs > 0)
                .then(|| Duration::from_secs(self.call_timeout_secs)),
            wire_format: self.wire_format,
        }
    }

    fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            graph: self.graph.clone(),
            kind: self.kind,
            label: self.label.clone(),
            batch_size: self.batch_size.get(),
            mode: self.mode,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.log_format);
    ExitCode::from(run(args).await)
}

async fn run(args: Args) -> u8 {
    let (handle, events) = match network::connect(&args.network_config()).await {
        Ok(channel) => channel,
        Err(e) => {
            error!(error = %e, "could not open channel");
            return EXIT_CONNECTION_FAILED;
        }
    };

    let router = Arc::new(CorrelationRouter::new(
        Arc::new(handle.clone()),
        args.rpc_config(),
    ));
    let dispatch = CorrelationRouter::spawn_dispatch(Arc::clone(&router), events);

    let accumulator = Arc::new(BulkAccumulator::new(args.graph.clone(), router));
    let drain = DrainLoop::new(args.drain_config(), accumulator, Arc::new(TracingObserver));
    let loader = SequentialLoader::new(Arc::new(JsonEdgeReader), drain);

    let code = tokio::select! {
        report = loader.run(args.sources) => {
            summarize(&report);
            report.exit_code()
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; abandoning in-flight batch");
            EXIT_INTERRUPTED
        }
    };

    handle.close("ingest finished");
    if tokio::time::timeout(Duration::from_secs(1), dispatch).await.is_err() {
        warn!("dispatch loop did not stop within 1s");
    }
    code
}

fn summarize(report: &LoaderReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(drained) => info!(
                source = %outcome.source,
                processed = drained.processed,
                failed_batches = drained.failed_batches,
                "source done"
            ),
            Err(e) => warn!(source = %outcome.source, error = %e, "source failed"),
        }
    }
    for skipped in &report.skipped {
        warn!(source = %skipped, "source skipped");
    }
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped.len(),
        "done!"
    );
}
