use async_trait::async_trait;
use graphbulk_core::{BulkPayload, BulkResult, Frame};

use crate::dataset::{EdgeSet, SourceDescriptor};
use crate::error::IngestError;

/// Outbound half of the request channel.
/// Implementations: the WebSocket [`ChannelHandle`](crate::network::ChannelHandle),
/// recording stubs in tests.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Enqueue one encoded frame for transmission.
    async fn send_frame(&self, frame: Frame) -> Result<(), IngestError>;
}

/// Carries one validated bulk payload to the remote store and returns its result.
/// Implemented by the [`CorrelationRouter`](crate::rpc::CorrelationRouter).
#[async_trait]
pub trait BulkTransport: Send + Sync {
    async fn send_bulk(&self, payload: BulkPayload) -> Result<BulkResult, IngestError>;
}

/// Loads the keyed edge collection named by a source descriptor.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn read(&self, source: &SourceDescriptor) -> anyhow::Result<EdgeSet>;
}
