#![cfg(feature = "axum")]

mod common;
use common::TestServer;

use msg_channel::{transport::ChannelWsCfg, ChannelRegistry, DEFAULT_CHANNEL_PATH};
use tokio::net::TcpListener;

/// Serve the channel endpoint using Axum.
async fn serve() -> TestServer {
    let registry = ChannelRegistry::new();
    let cfg = ChannelWsCfg::new(registry.clone());
    let shutdown = cfg.shutdown_signal();
    let app = cfg.into_default_router();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!(
        "ws://{}{DEFAULT_CHANNEL_PATH}",
        listener.local_addr().unwrap()
    );
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    TestServer {
        shutdown,
        registry,
        endpoint,
    }
}

#[tokio::test]
async fn fifo_across_writers() {
    common::fifo_across_writers(&serve().await).await;
}

#[tokio::test]
async fn teardown_after_last_participant() {
    common::teardown_after_last_participant(&serve().await).await;
}

#[tokio::test]
async fn duplicate_reader_rejected() {
    common::duplicate_reader_rejected(&serve().await).await;
}

#[tokio::test]
async fn malformed_request_rejected() {
    common::malformed_request_rejected(&serve().await).await;
}

#[tokio::test]
async fn malformed_payload_terminates_writer() {
    common::malformed_payload_terminates_writer(&serve().await).await;
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    common::shutdown_closes_sessions(&serve().await).await;
}

#[tokio::test]
async fn close_frame_is_echoed() {
    common::close_frame_is_echoed(&serve().await).await;
}

#[tokio::test]
async fn idle_socket_does_not_block_admission() {
    common::idle_socket_does_not_block_admission(&serve().await).await;
}
