use msg_channel::{transport::ChannelWsCfg, ChannelRegistry, DEFAULT_CHANNEL_PATH};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let port = std::env::args()
        .nth(1)
        .and_then(|src| src.parse().ok())
        .unwrap_or(8000u16);

    let registry = ChannelRegistry::new();
    let app = ChannelWsCfg::new(registry).into_default_router();

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!(
        "Relaying channels on ws://{}{DEFAULT_CHANNEL_PATH}",
        listener.local_addr()?
    );
    println!("connect with ?uuid=<id>&direction=read|write");
    println!("use Ctrl-C to stop");
    axum::serve(listener, app).await.map_err(Into::into)
}
