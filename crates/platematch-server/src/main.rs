use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use platematch_server::candidates::{WoltSource, DEFAULT_DISCOVERY_URL};
use platematch_server::coordinator::Coordinator;
use platematch_server::gateway::EventBus;
use platematch_server::registry::SessionRegistry;
use platematch_server::ws_server::WsServer;

const DEFAULT_BIND: &str = "127.0.0.1:9464";

#[derive(Parser)]
#[command(name = "platematch", about = "Real-time group restaurant matching server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (default when no subcommand given)
    Serve {
        /// Address for WebSocket client connections
        #[arg(long, env = "PLATEMATCH_BIND", default_value = DEFAULT_BIND)]
        bind: SocketAddr,

        /// Maximum concurrent WebSocket connections
        #[arg(long, env = "PLATEMATCH_MAX_CONNECTIONS", default_value_t = 64)]
        max_connections: usize,

        /// Evict sessions idle for this many seconds (0 disables eviction)
        #[arg(long, env = "PLATEMATCH_SESSION_TTL_SECS", default_value_t = 0)]
        session_ttl_secs: u64,

        /// Restaurant discovery API endpoint
        #[arg(long, env = "PLATEMATCH_DISCOVERY_URL", default_value = DEFAULT_DISCOVERY_URL)]
        discovery_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (bind, max_connections, session_ttl_secs, discovery_url) = match cli.command {
        Some(Commands::Serve {
            bind,
            max_connections,
            session_ttl_secs,
            discovery_url,
        }) => (bind, max_connections, session_ttl_secs, discovery_url),
        // Default to serve when no subcommand is given.
        None => (
            DEFAULT_BIND.parse()?,
            64,
            0,
            DEFAULT_DISCOVERY_URL.to_string(),
        ),
    };

    run_server(bind, max_connections, session_ttl_secs, discovery_url).await
}

async fn run_server(
    bind: SocketAddr,
    max_connections: usize,
    session_ttl_secs: u64,
    discovery_url: String,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind = %bind,
        max_connections,
        session_ttl_secs,
        discovery_url = %discovery_url,
        "starting platematch server"
    );

    let idle_ttl = match session_ttl_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let registry = Arc::new(SessionRegistry::new(idle_ttl));
    let coordinator = Arc::new(Coordinator::new(Arc::clone(&registry), EventBus::new()));
    let source = Arc::new(WoltSource::new(discovery_url));

    let cancel = CancellationToken::new();
    let sweeper = registry.spawn_sweeper(cancel.clone());
    if sweeper.is_some() {
        tracing::info!("idle-session sweeper enabled");
    }

    let server =
        WsServer::new(bind, coordinator, source, cancel.clone()).with_max_connections(max_connections);

    tokio::select! {
        result = server.run() => {
            match result {
                Ok(()) => tracing::warn!("ws server exited unexpectedly"),
                Err(e) => tracing::warn!("ws server error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    cancel.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    tracing::info!("platematch server stopped");
    Ok(())
}
