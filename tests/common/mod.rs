use msg_channel::{
    client::{ClientError, RecvChannel, SendChannel},
    transport::{CloseFrame, ServerShutdown},
    ChannelId, ChannelRegistry,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite;

const WAIT: Duration = Duration::from_secs(5);

/// A running server under test.
pub struct TestServer {
    pub shutdown: ServerShutdown,
    pub registry: ChannelRegistry,
    pub endpoint: String,
}

/// Poll `cond` until it holds, panicking after a few seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while !cond() {
        assert!(start.elapsed() < WAIT, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the next value, with a timeout.
pub async fn recv(reader: &mut RecvChannel) -> Value {
    tokio::time::timeout(WAIT, reader.next())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
}

#[track_caller]
fn assert_http_status(err: ClientError, status: u16) {
    match err {
        ClientError::Ws(tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status().as_u16(), status)
        }
        other => panic!("expected HTTP {status}, got {other:?}"),
    }
}

/// Values reach the reader in the order the queue received them, across
/// writers.
pub async fn fifo_across_writers(server: &TestServer) {
    let TestServer {
        registry, endpoint, ..
    } = server;
    let id = ChannelId::random();

    let mut a = SendChannel::connect(endpoint, id.clone()).await.unwrap();
    let mut b = SendChannel::connect(endpoint, id.clone()).await.unwrap();
    assert_eq!(registry.snapshot(&id).unwrap().writer_count, 2);

    b.send(&json!({"x": 2})).await.unwrap();
    wait_until("first enqueue", || registry.snapshot(&id).unwrap().queued == 1).await;
    a.send(&json!({"x": 1})).await.unwrap();
    wait_until("second enqueue", || registry.snapshot(&id).unwrap().queued == 2).await;

    let mut reader = RecvChannel::connect(endpoint, id.clone()).await.unwrap();
    let snapshot = registry.snapshot(&id).unwrap();
    assert!(snapshot.has_reader);
    assert_eq!(snapshot.writer_count, 2);

    assert_eq!(recv(&mut reader).await, json!({"x": 2}));
    assert_eq!(recv(&mut reader).await, json!({"x": 1}));

    // Live relay once the backlog is drained.
    a.send(&json!([1, "two", null])).await.unwrap();
    assert_eq!(recv(&mut reader).await, json!([1, "two", null]));
}

/// The channel disappears once every participant has disconnected.
pub async fn teardown_after_last_participant(server: &TestServer) {
    let TestServer {
        registry, endpoint, ..
    } = server;
    let (reader, writer) = msg_channel::client::channel(endpoint).await.unwrap();
    let id = reader.channel().clone();
    assert!(registry.contains(&id));

    reader.close().await.unwrap();
    wait_until("reader to leave", || {
        registry.snapshot(&id).is_some_and(|s| !s.has_reader)
    })
    .await;
    assert_eq!(registry.snapshot(&id).unwrap().writer_count, 1);

    writer.close().await.unwrap();
    wait_until("channel removal", || !registry.contains(&id)).await;
}

/// A second reader is rejected at the handshake, the first keeps working.
pub async fn duplicate_reader_rejected(server: &TestServer) {
    let TestServer {
        registry, endpoint, ..
    } = server;
    let (mut reader, mut writer) = msg_channel::client::channel(endpoint).await.unwrap();
    let id = reader.channel().clone();

    let err = RecvChannel::connect(endpoint, id.clone()).await.unwrap_err();
    assert_http_status(err, 409);

    let snapshot = registry.snapshot(&id).unwrap();
    assert!(snapshot.has_reader);
    assert_eq!(snapshot.writer_count, 1);

    writer.send("still here").await.unwrap();
    assert_eq!(recv(&mut reader).await, json!("still here"));
}

/// Requests without a channel id or direction are rejected.
pub async fn malformed_request_rejected(server: &TestServer) {
    let TestServer {
        registry, endpoint, ..
    } = server;

    let err = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .unwrap_err();
    assert_http_status(err.into(), 400);

    let err = tokio_tungstenite::connect_async(format!("{endpoint}?uuid=abc&direction=sideways"))
        .await
        .unwrap_err();
    assert_http_status(err.into(), 400);

    assert!(registry.is_empty());
}

/// A writer sending invalid JSON is closed with 1007 and deregistered.
pub async fn malformed_payload_terminates_writer(server: &TestServer) {
    let TestServer {
        registry, endpoint, ..
    } = server;
    let (mut reader, mut writer) = msg_channel::client::channel(endpoint).await.unwrap();
    let id = reader.channel().clone();

    writer.send_raw("{\"ok\": true}").await.unwrap();
    writer.send_raw("{not json").await.unwrap();

    let frame = tokio::time::timeout(WAIT, writer.closed())
        .await
        .expect("writer was not closed")
        .unwrap()
        .expect("no close frame");
    assert_eq!(frame.code, CloseFrame::INVALID_PAYLOAD);

    wait_until("writer to be dropped", || {
        registry.snapshot(&id).is_some_and(|s| s.writer_count == 0)
    })
    .await;
    assert!(registry.snapshot(&id).unwrap().has_reader);
    assert_eq!(recv(&mut reader).await, json!({"ok": true}));
}

/// Shutting down closes idle readers with 1001 and empties the registry.
pub async fn shutdown_closes_sessions(server: &TestServer) {
    let TestServer {
        registry,
        endpoint,
        shutdown,
    } = server;
    let (mut reader, _writer) = msg_channel::client::channel(endpoint).await.unwrap();

    shutdown.cancel();

    let res = tokio::time::timeout(WAIT, reader.next::<Value>())
        .await
        .expect("reader was not closed");
    match res {
        Err(ClientError::Closed(Some(frame))) => assert_eq!(frame, CloseFrame::going_away()),
        other => panic!("expected a going-away close, got {other:?}"),
    }
    wait_until("registry to empty", || registry.is_empty()).await;
}

/// A peer's close frame is echoed back unchanged, and the peer leaves the
/// channel.
pub async fn close_frame_is_echoed(server: &TestServer) {
    let TestServer {
        registry, endpoint, ..
    } = server;
    let (reader, writer) = msg_channel::client::channel(endpoint).await.unwrap();
    let id = reader.channel().clone();

    let bye = CloseFrame::new(4000, "bye");
    let echo = tokio::time::timeout(WAIT, writer.close_with(bye.clone()))
        .await
        .expect("no close reply")
        .unwrap();
    assert_eq!(echo, Some(bye));
    wait_until("writer to leave", || {
        registry.snapshot(&id).is_some_and(|s| s.writer_count == 0)
    })
    .await;

    let done = CloseFrame::new(1000, "done reading");
    let echo = tokio::time::timeout(WAIT, reader.close_with(done.clone()))
        .await
        .expect("no close reply")
        .unwrap();
    assert_eq!(echo, Some(done));
    wait_until("channel removal", || !registry.contains(&id)).await;
}

/// A connection that never sends its upgrade request does not hold up
/// anyone else.
pub async fn idle_socket_does_not_block_admission(server: &TestServer) {
    let addrs = url::Url::parse(&server.endpoint)
        .unwrap()
        .socket_addrs(|| None)
        .unwrap();
    let _idle = tokio::net::TcpStream::connect(addrs[0]).await.unwrap();

    let (mut reader, mut writer) =
        tokio::time::timeout(WAIT, msg_channel::client::channel(&server.endpoint))
            .await
            .expect("admission blocked by an idle socket")
            .unwrap();
    writer.send(&true).await.unwrap();
    assert_eq!(recv(&mut reader).await, json!(true));
}
