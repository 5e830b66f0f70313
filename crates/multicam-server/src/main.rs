//! # Multicam Server
//!
//! Single binary serving:
//! - REST API (LiveKit tokens, room management, default rooms)
//! - Signaling relay WebSocket at `/socket`
//!
//! Both share one listener. TLS is expected to be terminated by a reverse
//! proxy in front of it.

mod probe;

use clap::{Parser, Subcommand};
use multicam_api::{
    build_router,
    defaults::{initialize_default_rooms, InitReport},
    room_service::{InMemoryRoomService, LiveKitRoomClient, RoomService},
    AppState,
};
use multicam_common::{
    config::{AppConfig, RoomServiceMode},
    livekit::TokenSigner,
};
use multicam_signaling::SignalingState;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "multicam", version, about = "Multi-device video chat server")]
struct Cli {
    /// Bind address (overrides server.host)
    #[arg(long, env = "MULTICAM_HOST", global = true)]
    host: Option<String>,

    /// Listen port (overrides server.port)
    #[arg(long, env = "MULTICAM_PORT", global = true)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the API and signaling relay (default)
    Serve,
    /// Create the default rooms and print the summary
    InitRooms,
    /// Check WebSocket reachability of LiveKit and the signaling relay
    Probe {
        /// Signaling URL to test; defaults to this server's `/socket`
        #[arg(long)]
        signaling_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = multicam_common::config::init()?;

    init_tracing(cli.log_json);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, cli.host, cli.port).await,
        Command::InitRooms => init_rooms(config).await,
        Command::Probe { signaling_url } => {
            let signaling_url = signaling_url.unwrap_or_else(|| {
                let port = cli.port.unwrap_or(config.server.port);
                format!("ws://localhost:{port}/socket")
            });
            let report = probe::run(&config.livekit.ws_url, &signaling_url).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                anyhow::bail!("connectivity probe failed");
            }
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "multicam=debug,tower_http=debug".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn room_service(config: &AppConfig) -> anyhow::Result<Arc<dyn RoomService>> {
    Ok(match config.livekit.mode {
        RoomServiceMode::Livekit => {
            let client = LiveKitRoomClient::new(&config.livekit)?;
            tracing::info!("🎥 LiveKit room service at {}", client.base_url());
            Arc::new(client)
        }
        RoomServiceMode::Memory => {
            tracing::warn!("Using in-memory room service; rooms are not forwarded to LiveKit");
            Arc::new(InMemoryRoomService::new())
        }
    })
}

async fn serve(config: &AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting Multicam v{}", env!("CARGO_PKG_VERSION"));

    // === Signaling relay ===
    // The API reads the same registry for /api/signaling/rooms.
    let signaling_state = SignalingState::new(config.signaling.clone());
    let registry = signaling_state.registry.clone();
    let signaling_router = multicam_signaling::build_router(signaling_state);

    // === REST API ===
    let api_state = AppState::new(
        room_service(config)?,
        TokenSigner::from_config(&config.livekit),
        registry,
    );
    let app = build_router(api_state).merge(signaling_router);

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let addr = SocketAddr::new(host.parse()?, port.unwrap_or(config.server.port));

    tracing::info!("📡 REST API listening on http://{addr}/api");
    tracing::info!("🔌 Signaling listening on ws://{addr}/socket");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn init_rooms(config: &AppConfig) -> anyhow::Result<()> {
    let service = room_service(config)?;
    let report = initialize_default_rooms(service.as_ref()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    ensure_all_created(&report)
}

/// The HTTP route always answers `success: true`; the CLI exits non-zero
/// when any room could not be created.
fn ensure_all_created(report: &InitReport) -> anyhow::Result<()> {
    if report.summary.failed > 0 {
        anyhow::bail!("{} of {} rooms failed", report.summary.failed, report.summary.total);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
