//! Channel handle and the messages exchanged with the socket tasks.
//!
//! The handle holds the sender end of a bounded mpsc channel drained by the
//! WebSocket write loop, which gives `send` enqueue-only semantics with
//! backpressure, and shares the [`ChannelLifecycle`] with both socket tasks
//! so a dead socket invalidates the handle immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphbulk_core::Frame;
use tokio::sync::mpsc;

use super::state::{ChannelLifecycle, ChannelState};
use crate::error::IngestError;
use crate::traits::FrameSink;

/// Message handed to the write loop.
#[derive(Debug)]
pub enum OutboundMessage {
    /// An encoded request frame.
    Frame(Frame),
    /// A close frame with an optional reason.
    Close(Option<String>),
}

/// Event delivered by the transport to its single consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A raw inbound frame.
    Frame(Frame),
    /// The socket closed or failed. No further events follow.
    Closed { reason: String },
}

/// Handle to the open channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: mpsc::Sender<OutboundMessage>,
    lifecycle: Arc<ChannelLifecycle>,
    send_timeout: Duration,
}

impl ChannelHandle {
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<OutboundMessage>,
        lifecycle: Arc<ChannelLifecycle>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            lifecycle,
            send_timeout,
        }
    }

    /// Enqueues a frame for the write loop.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::ChannelClosed` if the channel has been
    /// invalidated or the write loop is gone, and `IngestError::Timeout` if
    /// the outbound queue stays full for the whole send timeout.
    pub async fn send(&self, frame: Frame) -> Result<(), IngestError> {
        if let Some(reason) = self.lifecycle.closed_reason() {
            return Err(IngestError::closed(reason));
        }
        match tokio::time::timeout(self.send_timeout, self.tx.send(OutboundMessage::Frame(frame)))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(IngestError::closed(
                self.lifecycle
                    .closed_reason()
                    .unwrap_or_else(|| "write loop stopped".to_string()),
            )),
            Err(_) => Err(IngestError::Timeout {
                what: "outbound enqueue".to_string(),
                timeout_ms: u64::try_from(self.send_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Requests a graceful close and invalidates the handle.
    pub fn close(&self, reason: &str) {
        // The write loop may already be gone; the handle is invalid either way.
        let _ = self
            .tx
            .try_send(OutboundMessage::Close(Some(reason.to_string())));
        self.lifecycle.close(reason);
    }

    /// Checks whether frames can still be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lifecycle.state() == ChannelState::Open && !self.tx.is_closed()
    }

    /// Shared lifecycle, for callers that want to watch for closure.
    #[must_use]
    pub fn lifecycle(&self) -> Arc<ChannelLifecycle> {
        Arc::clone(&self.lifecycle)
    }
}

#[async_trait]
impl FrameSink for ChannelHandle {
    async fn send_frame(&self, frame: Frame) -> Result<(), IngestError> {
        self.send(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_handle(capacity: usize) -> (ChannelHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let lifecycle = Arc::new(ChannelLifecycle::new());
        lifecycle.set_open();
        (
            ChannelHandle::new(tx, lifecycle, Duration::from_millis(50)),
            rx,
        )
    }

    #[tokio::test]
    async fn send_enqueues_frame() {
        let (handle, mut rx) = open_handle(4);
        handle.send(Frame::Text("hi".to_string())).await.unwrap();

        match rx.recv().await {
            Some(OutboundMessage::Frame(Frame::Text(text))) => assert_eq!(text, "hi"),
            other => panic!("unexpected outbound message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_after_close_fails_with_channel_closed() {
        let (handle, _rx) = open_handle(4);
        handle.lifecycle().close("server went away");

        let err = handle.send(Frame::Text("x".to_string())).await.unwrap_err();
        assert_eq!(
            err,
            IngestError::ChannelClosed {
                reason: "server went away".to_string()
            }
        );
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn send_when_write_loop_gone_fails_with_channel_closed() {
        let (handle, rx) = open_handle(4);
        drop(rx);

        let err = handle.send(Frame::Text("x".to_string())).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn send_times_out_on_full_queue() {
        let (handle, _rx) = open_handle(1);
        handle.send(Frame::Text("1".to_string())).await.unwrap();

        let err = handle.send(Frame::Text("2".to_string())).await.unwrap_err();
        assert!(matches!(err, IngestError::Timeout { .. }));
    }

    #[tokio::test]
    async fn close_enqueues_close_frame_and_invalidates() {
        let (handle, mut rx) = open_handle(4);
        assert!(handle.is_open());

        handle.close("done");

        assert!(matches!(
            rx.recv().await,
            Some(OutboundMessage::Close(Some(reason))) if reason == "done"
        ));
        assert!(!handle.is_open());
    }
}
