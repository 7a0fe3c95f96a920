//! Correlation router: pairs each request with the inbound frame that settles it.
//!
//! Every call registers a oneshot sender under a fresh token in a `DashMap`,
//! so the dispatch task can complete it without locking the callers. Removal
//! from the map is the single point of completion, which makes settlement
//! idempotent: whichever of response, channel failure, or deadline removes the
//! entry first decides the outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use graphbulk_core::codec;
use graphbulk_core::{actions, BulkPayload, BulkResult, Frame, RequestFrame, SettlementFrame};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::RpcConfig;
use crate::error::IngestError;
use crate::network::ChannelEvent;
use crate::traits::{BulkTransport, FrameSink};

/// Result body of a settled call: every field of the settlement frame
/// except the token and error.
pub type ResponseBody = serde_json::Map<String, serde_json::Value>;

type Completion = oneshot::Sender<Result<ResponseBody, IngestError>>;

/// Routes calls over a [`FrameSink`] and settles them from inbound frames.
pub struct CorrelationRouter {
    sink: Arc<dyn FrameSink>,
    pending: DashMap<String, Completion>,
    next_token: AtomicU64,
    closed: ArcSwapOption<String>,
    config: RpcConfig,
}

impl CorrelationRouter {
    #[must_use]
    pub fn new(sink: Arc<dyn FrameSink>, config: RpcConfig) -> Self {
        Self {
            sink,
            pending: DashMap::new(),
            next_token: AtomicU64::new(1),
            closed: ArcSwapOption::empty(),
            config,
        }
    }

    /// Sends `action` with `object` and waits for the matching settlement.
    ///
    /// # Errors
    ///
    /// - `ChannelClosed` if the channel failed before or while waiting
    /// - `Remote` if the endpoint settled the call with an error
    /// - `Timeout` if the call deadline expired
    /// - `Codec` if the request could not be encoded
    pub async fn call(
        &self,
        action: &str,
        object: serde_json::Value,
    ) -> Result<ResponseBody, IngestError> {
        if let Some(reason) = self.closed.load_full() {
            return Err(IngestError::closed(reason.as_str()));
        }

        let (token, rx) = self.register();
        let _guard = PendingGuard {
            pending: &self.pending,
            token: &token,
        };

        // A failure that landed between the first check and registration has
        // already drained the map, so it would never reach this call.
        if let Some(reason) = self.closed.load_full() {
            return Err(IngestError::closed(reason.as_str()));
        }

        let request = RequestFrame {
            callback_token: token.clone(),
            action: action.to_string(),
            object,
        };
        let frame = codec::encode(&request, self.config.wire_format)?;
        debug!(token = %token, action, bytes = frame.len(), "sending request");
        self.sink.send_frame(frame).await?;

        let settled = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    warn!(token = %token, action, "call deadline expired");
                    return Err(IngestError::Timeout {
                        what: format!("call {token} ({action})"),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => rx.await,
        };

        settled.unwrap_or_else(|_| Err(IngestError::closed("pending call dropped")))
    }

    /// Settles the pending call named by an inbound frame.
    ///
    /// Frames that cannot be decoded, carry no token, or name a token with no
    /// pending call are logged and dropped.
    pub fn dispatch(&self, frame: &Frame) {
        let value: serde_json::Value = match codec::decode(frame) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        let settlement = match SettlementFrame::from_value(value) {
            Ok(settlement) => settlement,
            Err(e) => {
                warn!(error = %e, "dropping frame that is not a settlement");
                return;
            }
        };
        let Some(token) = settlement.callback_token.clone() else {
            debug!("ignoring frame without callback token");
            return;
        };
        let Some((_, completion)) = self.pending.remove(&token) else {
            warn!(token = %token, "no pending call for token; dropping frame");
            return;
        };

        let outcome = match settlement.error_message() {
            Some(message) => Err(IngestError::Remote { message }),
            None => Ok(settlement.body),
        };
        debug!(token = %token, ok = outcome.is_ok(), "settled call");
        // The caller may have stopped waiting; nothing to do then.
        let _ = completion.send(outcome);
    }

    /// Rejects every pending call with `ChannelClosed` and refuses new calls.
    ///
    /// Returns the number of calls rejected.
    pub fn abort_all(&self, reason: &str) -> usize {
        self.closed.store(Some(Arc::new(reason.to_string())));

        let tokens: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut aborted = 0;
        for token in tokens {
            if let Some((_, completion)) = self.pending.remove(&token) {
                let _ = completion.send(Err(IngestError::closed(reason)));
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, reason, "rejected pending calls");
        }
        aborted
    }

    /// Number of calls currently waiting for a settlement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether the router has been shut down by a channel failure.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load().is_some()
    }

    /// Consumes transport events until the channel closes, settling calls
    /// from inbound frames. Pending calls are rejected when the channel closes
    /// or the event stream ends.
    pub fn spawn_dispatch(
        router: Arc<Self>,
        mut events: mpsc::Receiver<ChannelEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Some(ChannelEvent::Frame(frame)) => router.dispatch(&frame),
                    Some(ChannelEvent::Closed { reason }) => {
                        router.abort_all(&reason);
                        break;
                    }
                    None => {
                        router.abort_all("event stream ended");
                        break;
                    }
                }
            }
            debug!("dispatch loop stopped");
        })
    }

    fn register(&self) -> (String, oneshot::Receiver<Result<ResponseBody, IngestError>>) {
        let (tx, rx) = oneshot::channel();
        loop {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed).to_string();
            match self.pending.entry(token.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(tx);
                    return (token, rx);
                }
                Entry::Occupied(_) => continue,
            }
        }
    }
}

#[async_trait]
impl BulkTransport for CorrelationRouter {
    async fn send_bulk(&self, payload: BulkPayload) -> Result<BulkResult, IngestError> {
        let object =
            serde_json::to_value(&payload).map_err(|e| IngestError::Codec(e.to_string()))?;
        let body = self.call(actions::BULK, object).await?;
        serde_json::from_value(serde_json::Value::Object(body))
            .map_err(|e| IngestError::Codec(format!("malformed bulk result: {e}")))
    }
}

/// Removes the call's entry however the call ends (settled, timed out,
/// failed to send, or cancelled by dropping the future).
struct PendingGuard<'a> {
    pending: &'a DashMap<String, Completion>,
    token: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.token);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
