//! Error taxonomy for the ingest pipeline.

use graphbulk_core::{CodecError, ValidationError};

/// Errors surfaced by the transport, router, accumulator, and drain loop.
///
/// [`IngestError::is_fatal`] separates errors that end the whole run from
/// errors that only fail the batch they occurred in.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("cannot connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },
    #[error("channel closed: {reason}")]
    ChannelClosed { reason: String },
    #[error("invalid operation: {0}")]
    InvalidOperation(#[from] ValidationError),
    #[error("remote error: {message}")]
    Remote { message: String },
    #[error("{what} timed out after {timeout_ms}ms")]
    Timeout { what: String, timeout_ms: u64 },
    #[error("codec error: {0}")]
    Codec(String),
}

impl IngestError {
    /// Whether the error means the channel is gone, so no later batch or
    /// source can succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::ChannelClosed { .. })
    }

    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        Self::ChannelClosed {
            reason: reason.into(),
        }
    }
}

impl From<CodecError> for IngestError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err.to_string())
    }
}
