use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use chatbridge_common::models::ConfigUpdate;
use chatbridge_core::platforms::tiktok::runtime::DEFAULT_RELAY_URL;

mod context;
mod server;

use context::ServerContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "chatbridge")]
#[command(author, version, about = "ChatBridge - merged TikTok + Twitch live chat feed for stream overlays")]
struct Args {
    /// Address to bind the HTTP / websocket server to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// TikTok username to connect at startup ("NONE" or empty = off)
    #[arg(long, env = "TIKTOK_USERNAME")]
    tiktok_username: Option<String>,

    /// Twitch channel to join at startup ("NONE" or empty = off)
    #[arg(long, env = "TWITCH_CHANNEL")]
    twitch_channel: Option<String>,

    /// Websocket endpoint of the TikTok webcast relay
    #[arg(long, env = "TIKTOK_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    tiktok_relay_url: String,

    /// Demo feed period while no platform is configured
    #[arg(long, env = "DEMO_INTERVAL_MS", default_value_t = 3000)]
    demo_interval_ms: u64,

    /// Directory with the overlay/dashboard static files
    #[arg(long, env = "PUBLIC_DIR")]
    public_dir: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatbridge=info,chatbridge_core=info,tower_http=info"));
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("ChatBridge starting. bind={}:{}, relay={}", args.bind, args.port, args.tiktok_relay_url);

    let ctx = ServerContext::new(
        &args.tiktok_relay_url,
        Duration::from_millis(args.demo_interval_ms.max(1)),
        args.public_dir.clone(),
    )
    .context("building server context")?;

    ctx.supervisor.start().await;
    tokio::spawn(ctx.supervisor.clone().watch_streams());

    let initial = ConfigUpdate {
        tiktok_username: args.tiktok_username.clone(),
        twitch_channel: args.twitch_channel.clone(),
        ..ConfigUpdate::default()
    };
    if !initial.is_empty() {
        ctx.supervisor
            .apply_configuration(initial)
            .await
            .context("applying startup identities")?;
    }

    let addr = SocketAddr::new(args.bind, args.port);
    let supervisor = ctx.supervisor.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("ctrl-c handler failed: {}", e);
        }
        info!("Shutdown requested");
        supervisor.shutdown().await;
    };

    server::serve(ctx, addr, shutdown).await.context("http server")?;
    info!("Main finished. Goodbye!");
    Ok(())
}
