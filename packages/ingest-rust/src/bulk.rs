//! Bulk accumulator: coalesces component operations into one bulk request.
//!
//! While open, [`BulkAccumulator::push`] only appends to an in-memory buffer.
//! [`BulkAccumulator::flush`] moves the buffer out under a short lock, so
//! pushes that race a flush land in the next envelope, then validates and
//! sends the envelope through the [`BulkTransport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use graphbulk_core::{BulkEnvelope, BulkResult, WireOperation};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::IngestError;
use crate::traits::BulkTransport;

/// Buffers operations for one graph between flushes.
pub struct BulkAccumulator {
    graph: String,
    transport: Arc<dyn BulkTransport>,
    open: AtomicBool,
    buffer: Mutex<Vec<WireOperation>>,
}

impl BulkAccumulator {
    #[must_use]
    pub fn new(graph: impl Into<String>, transport: Arc<dyn BulkTransport>) -> Self {
        Self {
            graph: graph.into(),
            transport,
            open: AtomicBool::new(false),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Marks the bulk area active. Entity calls made while open are pushed
    /// here instead of being sent individually.
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    /// Deactivates the bulk area. Buffered operations stay until the next
    /// flush.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Appends one operation without transmitting anything.
    pub fn push(&self, op: WireOperation) {
        self.buffer.lock().push(op);
    }

    /// Number of operations waiting for the next flush.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Graph every envelope from this accumulator is addressed to.
    #[must_use]
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Sends everything buffered so far as a single bulk request.
    ///
    /// The buffer is emptied before validation, so the operations of a
    /// failed flush are dropped rather than carried into the next one.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if any buffered operation has a non-integer id;
    ///   nothing is sent in that case
    /// - `Remote` if the store reports `errors: true` or rejects the request
    /// - any transport error from the router
    pub async fn flush(&self) -> Result<BulkResult, IngestError> {
        let operations = std::mem::take(&mut *self.buffer.lock());
        if operations.is_empty() {
            debug!(graph = %self.graph, "flush with empty buffer; nothing sent");
            return Ok(BulkResult::empty());
        }

        let envelope = BulkEnvelope::new(self.graph.clone(), operations);
        let ops = envelope.len();
        let payload = envelope.into_payload()?;

        let result = self.transport.send_bulk(payload).await?;
        if result.errors {
            let failed = result
                .items
                .iter()
                .filter(|item| item_failed(item))
                .count();
            return Err(IngestError::Remote {
                message: format!("bulk request reported errors for {failed} of {ops} operations"),
            });
        }
        debug!(graph = %self.graph, ops, took = result.took, "bulk flush acknowledged");
        Ok(result)
    }
}

/// Whether one item of a bulk result carries an error, e.g.
/// `{"index": {"_id": "1", "error": {...}}}`.
fn item_failed(item: &serde_json::Value) -> bool {
    item.as_object().is_some_and(|actions| {
        actions
            .values()
            .any(|outcome| outcome.get("error").is_some_and(|e| !e.is_null()))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
