mod common;
use common::TestServer;

use msg_channel::{transport::Connect, ChannelRegistry, DEFAULT_CHANNEL_PATH};
use tokio::net::TcpListener;

async fn serve_ws() -> TestServer {
    let registry = ChannelRegistry::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!(
        "ws://{}{DEFAULT_CHANNEL_PATH}",
        listener.local_addr().unwrap()
    );
    let shutdown = listener.serve(registry.clone()).await.unwrap();

    TestServer {
        shutdown,
        registry,
        endpoint,
    }
}

#[tokio::test]
async fn fifo_across_writers() {
    common::fifo_across_writers(&serve_ws().await).await;
}

#[tokio::test]
async fn teardown_after_last_participant() {
    common::teardown_after_last_participant(&serve_ws().await).await;
}

#[tokio::test]
async fn duplicate_reader_rejected() {
    common::duplicate_reader_rejected(&serve_ws().await).await;
}

#[tokio::test]
async fn malformed_request_rejected() {
    common::malformed_request_rejected(&serve_ws().await).await;
}

#[tokio::test]
async fn malformed_payload_terminates_writer() {
    common::malformed_payload_terminates_writer(&serve_ws().await).await;
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    common::shutdown_closes_sessions(&serve_ws().await).await;
}

#[tokio::test]
async fn close_frame_is_echoed() {
    common::close_frame_is_echoed(&serve_ws().await).await;
}

#[tokio::test]
async fn idle_socket_does_not_block_admission() {
    common::idle_socket_does_not_block_admission(&serve_ws().await).await;
}

#[tokio::test]
async fn servers_can_share_a_registry() {
    let first = serve_ws().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second_endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let _second = listener.serve(first.registry.clone()).await.unwrap();

    let (mut reader, _writer) = msg_channel::client::channel(&first.endpoint).await.unwrap();
    let mut writer = msg_channel::client::SendChannel::connect(
        &second_endpoint,
        reader.channel().clone(),
    )
    .await
    .unwrap();

    writer.send(&42).await.unwrap();
    assert_eq!(common::recv(&mut reader).await, serde_json::json!(42));
    assert_eq!(
        first.registry.snapshot(reader.channel()).unwrap().writer_count,
        2
    );
}
