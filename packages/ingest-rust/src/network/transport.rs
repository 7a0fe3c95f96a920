//! WebSocket transport: connect, then run one write loop and one read loop.
//!
//! The write loop drains the handle's outbound queue into the socket; a write
//! failure only closes the lifecycle. The read loop forwards every data frame
//! to the event stream and is the sole emitter of the single `Closed` event,
//! sent when the socket ends or the lifecycle closes, after which the event
//! stream closes.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use graphbulk_core::Frame;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use super::config::{ConnectionConfig, NetworkConfig};
use super::connection::{ChannelEvent, ChannelHandle, OutboundMessage};
use super::state::ChannelLifecycle;
use crate::error::IngestError;

/// Opens the channel to the configured endpoint.
///
/// Returns the handle used to send frames and the event stream carrying
/// inbound frames and the final `Closed` event.
///
/// # Errors
///
/// Returns `IngestError::Connection` if the endpoint is unreachable, the
/// handshake fails, or it does not complete within `connect_timeout`.
pub async fn connect(
    config: &NetworkConfig,
) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), IngestError> {
    let connection_error = |reason: String| IngestError::Connection {
        endpoint: config.endpoint.clone(),
        reason,
    };

    let handshake = tokio_tungstenite::connect_async(config.endpoint.as_str());
    let (ws, _response) = match tokio::time::timeout(config.connect_timeout, handshake).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => return Err(connection_error(e.to_string())),
        Err(_) => {
            return Err(connection_error(format!(
                "handshake timed out after {}ms",
                config.connect_timeout.as_millis()
            )))
        }
    };

    info!(endpoint = %config.endpoint, "channel connected");
    Ok(start_channel(ws, &config.connection))
}

/// Spawns the socket tasks for an established WebSocket stream.
pub fn start_channel<T>(
    ws: WebSocketStream<T>,
    config: &ConnectionConfig,
) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let lifecycle = Arc::new(ChannelLifecycle::new());
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_channel_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.inbound_channel_capacity);

    let (sink, stream) = ws.split();
    tokio::spawn(write_loop(sink, outbound_rx, Arc::clone(&lifecycle)));
    tokio::spawn(read_loop(stream, Arc::clone(&lifecycle), event_tx));

    lifecycle.set_open();
    (
        ChannelHandle::new(outbound_tx, lifecycle, config.send_timeout),
        event_rx,
    )
}

async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<OutboundMessage>,
    lifecycle: Arc<ChannelLifecycle>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut closed = lifecycle.closed_receiver();
    loop {
        // Queued frames (including a requested close frame) go out before
        // the loop honours a closed lifecycle.
        let outbound = tokio::select! {
            biased;
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
            _ = closed.wait_for(|is_closed| *is_closed) => break,
        };
        let (message, closing) = match outbound {
            OutboundMessage::Frame(Frame::Text(text)) => {
                debug!(bytes = text.len(), "writing text frame");
                (Message::text(text), false)
            }
            OutboundMessage::Frame(Frame::Binary(bytes)) => {
                debug!(bytes = bytes.len(), "writing binary frame");
                (Message::binary(bytes), false)
            }
            OutboundMessage::Close(reason) => (
                Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: reason.unwrap_or_default().into(),
                })),
                true,
            ),
        };

        if let Err(e) = sink.send(message).await {
            let reason = format!("write failed: {e}");
            error!(%reason, "channel write failed");
            lifecycle.close(&reason);
            return;
        }
        if closing {
            break;
        }
    }
    debug!("write loop stopped");
}

async fn read_loop<St>(
    mut stream: St,
    lifecycle: Arc<ChannelLifecycle>,
    events: mpsc::Sender<ChannelEvent>,
) where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut closed = lifecycle.closed_receiver();
    let reason = loop {
        let next = tokio::select! {
            biased;
            next = stream.next() => next,
            _ = closed.wait_for(|is_closed| *is_closed) => {
                break lifecycle
                    .closed_reason()
                    .unwrap_or_else(|| "closed locally".to_string());
            }
        };
        let frame = match next {
            Some(Ok(Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
            Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes.to_vec()),
            Some(Ok(Message::Close(close))) => {
                break close.map_or_else(
                    || "closed by peer".to_string(),
                    |f| format!("closed by peer ({}): {}", u16::from(f.code), f.reason.as_str()),
                )
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("read failed: {e}"),
            None => break "stream ended".to_string(),
        };
        debug!(bytes = frame.len(), "received frame");
        if events.send(ChannelEvent::Frame(frame)).await.is_err() {
            break "event consumer dropped".to_string();
        }
    };

    if lifecycle.close(&reason) {
        warn!(%reason, "channel closed");
    }
    let reason = lifecycle.closed_reason().unwrap_or(reason);
    let _ = events.send(ChannelEvent::Closed { reason }).await;
}
