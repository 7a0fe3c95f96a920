//! End-to-end runs of the loader against an in-process WebSocket store.

use std::io::Write;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use graphbulk_core::{codec, Frame, RequestFrame, WireFormat};
use graphbulk_ingest::drain::NoopObserver;
use graphbulk_ingest::{
    network, BulkAccumulator, CorrelationRouter, DrainConfig, DrainLoop, IngestError,
    JsonEdgeReader, LoaderReport, NetworkConfig, RpcConfig, SequentialLoader, SourceDescriptor,
    SourceFailure,
};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// How the fake store treats the n-th (1-based) request.
#[derive(Clone, Copy, Default)]
struct StoreScript {
    hang_up_on: Option<usize>,
    reject: Option<usize>,
}

/// Bulk objects the store received, in arrival order.
type Received = Arc<Mutex<Vec<serde_json::Value>>>;

async fn spawn_store(script: StoreScript) -> (String, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let received: Received = Arc::default();
    let seen = Arc::clone(&received);

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let mut n = 0;

        while let Some(Ok(message)) = ws.next().await {
            let (frame, format) = match message {
                Message::Text(text) => (Frame::Text(text.as_str().to_owned()), WireFormat::Json),
                Message::Binary(bytes) => (Frame::Binary(bytes.to_vec()), WireFormat::MsgPack),
                Message::Close(_) => break,
                _ => continue,
            };
            let request: RequestFrame<serde_json::Value> = codec::decode(&frame).unwrap();
            assert_eq!(request.action, "bulk");
            n += 1;
            seen.lock().push(request.object);

            if script.hang_up_on == Some(n) {
                let _ = ws.close(None).await;
                break;
            }
            let reply = if script.reject == Some(n) {
                json!({"callbackToken": request.callback_token, "error": "shard unavailable"})
            } else {
                json!({"callbackToken": request.callback_token, "took": 1, "errors": false, "items": []})
            };
            let reply = match codec::encode(&reply, format).unwrap() {
                Frame::Text(text) => Message::text(text),
                Frame::Binary(bytes) => Message::binary(bytes),
            };
            if ws.send(reply).await.is_err() {
                break;
            }
        }
    });

    (endpoint, received)
}

fn edge_file(contents: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

async fn run_pipeline(
    endpoint: String,
    wire_format: WireFormat,
    sources: Vec<SourceDescriptor>,
) -> LoaderReport {
    let (handle, events) = network::connect(&NetworkConfig {
        endpoint,
        ..NetworkConfig::default()
    })
    .await
    .unwrap();

    let router = Arc::new(CorrelationRouter::new(
        Arc::new(handle.clone()),
        RpcConfig {
            wire_format,
            ..RpcConfig::default()
        },
    ));
    CorrelationRouter::spawn_dispatch(Arc::clone(&router), events);

    let accumulator = Arc::new(BulkAccumulator::new("pokec", router));
    let drain = DrainLoop::new(
        DrainConfig {
            batch_size: 2,
            ..DrainConfig::default()
        },
        accumulator,
        Arc::new(NoopObserver),
    );
    let report = SequentialLoader::new(Arc::new(JsonEdgeReader), drain)
        .run(sources)
        .await;
    handle.close("test done");
    report
}

/// Ids of every operation in the received bulk objects, per request.
fn ids(received: &Received) -> Vec<Vec<String>> {
    received
        .lock()
        .iter()
        .map(|object| {
            object["operations"]
                .as_array()
                .unwrap()
                .iter()
                .map(|line| line[2].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn sources_stream_in_batches_with_offsets() {
    let (endpoint, received) = spawn_store(StoreScript::default()).await;
    let a = edge_file(&json!({"1": [2, 3], "0": [1, 2], "2": [3, 4]}));
    let b = edge_file(&json!({"0": [5, 6]}));

    let report = run_pipeline(
        endpoint,
        WireFormat::Json,
        vec![
            SourceDescriptor::new(a.path(), 0),
            SourceDescriptor::new(b.path(), 100),
        ],
    )
    .await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(ids(&received), [vec!["0", "1"], vec!["2"], vec!["100"]]);

    let first = received.lock()[0].clone();
    assert_eq!(first["index"], "pokec");
    let line = &first["operations"][0];
    assert_eq!(line[0], "index");
    assert_eq!(line[1], "e");
    let body: serde_json::Value = serde_json::from_str(line[3].as_str().unwrap()).unwrap();
    assert_eq!(
        body,
        json!({"id": 0, "label": "KNOWS", "prop": {}, "source": 1, "target": 2})
    );
}

#[tokio::test]
async fn msgpack_frames_round_trip_through_the_store() {
    let (endpoint, received) = spawn_store(StoreScript::default()).await;
    let a = edge_file(&json!({"0": [1, 2], "1": [2, 3], "2": [3, 4]}));

    let report = run_pipeline(
        endpoint,
        WireFormat::MsgPack,
        vec![SourceDescriptor::new(a.path(), 7)],
    )
    .await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(ids(&received), [vec!["7", "8"], vec!["9"]]);
}

#[tokio::test]
async fn rejected_batch_is_skipped_and_loading_continues() {
    let (endpoint, received) = spawn_store(StoreScript {
        reject: Some(1),
        ..StoreScript::default()
    })
    .await;
    let a = edge_file(&json!({"0": [1, 2], "1": [2, 3], "2": [3, 4]}));

    let report = run_pipeline(
        endpoint,
        WireFormat::Json,
        vec![SourceDescriptor::new(a.path(), 0)],
    )
    .await;

    assert_eq!(received.lock().len(), 2);
    let drained = report.outcomes[0].result.as_ref().unwrap();
    assert_eq!(drained.failed_batches, 1);
    assert_eq!(drained.processed, 3);
}

#[tokio::test]
async fn hang_up_stops_the_run_and_skips_later_sources() {
    let (endpoint, received) = spawn_store(StoreScript {
        hang_up_on: Some(2),
        ..StoreScript::default()
    })
    .await;
    let a = edge_file(&json!({"0": [1, 2], "1": [2, 3], "2": [3, 4], "3": [4, 5]}));
    let b = edge_file(&json!({"0": [5, 6]}));
    let skipped = SourceDescriptor::new(b.path(), 0);

    let report = run_pipeline(
        endpoint,
        WireFormat::Json,
        vec![SourceDescriptor::new(a.path(), 0), skipped.clone()],
    )
    .await;

    assert_eq!(received.lock().len(), 2);
    assert!(matches!(report.fatal, Some(IngestError::ChannelClosed { .. })));
    assert!(matches!(
        report.outcomes[0].result,
        Err(SourceFailure::Drain(IngestError::ChannelClosed { .. }))
    ));
    assert_eq!(report.skipped, [skipped]);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn unreadable_source_does_not_stop_the_run() {
    let (endpoint, received) = spawn_store(StoreScript::default()).await;
    let good = edge_file(&json!({"0": [1, 2]}));
    let bad = edge_file(&json!({"0": "not a pair"}));

    let report = run_pipeline(
        endpoint,
        WireFormat::Json,
        vec![
            SourceDescriptor::new(bad.path(), 0),
            SourceDescriptor::new(good.path(), 0),
        ],
    )
    .await;

    assert!(matches!(report.outcomes[0].result, Err(SourceFailure::Load(_))));
    assert!(report.outcomes[1].result.is_ok());
    assert_eq!(ids(&received), [vec!["0"]]);
}
