use msg_channel::{
    client::{RecvChannel, SendChannel},
    transport::Connect,
    ChannelId, ChannelRegistry,
};
use serde_json::{json, Value};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let registry = ChannelRegistry::new();
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);

    // Dropping the shutdown signal stops the server.
    let shutdown = listener.serve(registry.clone()).await?;

    let id = ChannelId::random();
    let mut events = SendChannel::connect(&endpoint, id.clone()).await?;
    let mut results = SendChannel::connect(&endpoint, id.clone()).await?;

    // Writers may send before the reader shows up. Values wait in the queue.
    events.send(&json!({"event": "started"})).await?;
    results.send(&json!({"passed": 3, "failed": 0})).await?;

    let mut harness = RecvChannel::connect(&endpoint, id.clone()).await?;
    println!("{:?}", registry.snapshot(&id));

    for _ in 0..2 {
        let value: Value = harness.next().await?;
        println!("received {value}");
    }

    events.close().await?;
    results.close().await?;
    harness.close().await?;

    shutdown.shutdown().await;
    Ok(())
}
