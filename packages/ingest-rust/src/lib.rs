//! graphbulk Ingest: streams keyed edge files into a remote graph store as
//! bulk requests over one correlated WebSocket channel.
//!
//! Layering, leaf to root: [`network`] owns the socket, [`rpc`] correlates
//! requests with their settlements, [`bulk`] coalesces operations into one
//! request, [`drain`] slices a source into batches, and [`loader`] runs the
//! sources one after another.

pub mod bulk;
pub mod client;
pub mod dataset;
pub mod drain;
pub mod error;
pub mod loader;
pub mod logging;
pub mod network;
pub mod rpc;
pub mod traits;

pub use bulk::BulkAccumulator;
pub use client::{Component, GraphClient};
pub use dataset::{EdgeRecord, EdgeSet, JsonEdgeReader, SourceDescriptor};
pub use drain::{DrainConfig, DrainLoop, DrainObserver, DrainReport, TracingObserver};
pub use error::IngestError;
pub use loader::{LoaderReport, SequentialLoader, SourceFailure, SourceOutcome};
pub use network::{ChannelEvent, ChannelHandle, ConnectionConfig, NetworkConfig};
pub use rpc::{CorrelationRouter, RpcConfig};
pub use traits::{BulkTransport, FrameSink, SourceReader};
