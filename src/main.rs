//! Skirmish server - authoritative multiplayer synchronization
//!
//! Serves the WebSocket endpoint players connect to and a health check, and
//! runs the world task that owns every session.

use std::future::IntoFuture;

use tokio::net::TcpListener;
use tracing::{error, info};

use skirmish::app::AppState;
use skirmish::config::Config;
use skirmish::http::build_router;
use skirmish::util::logging::init_tracing;
use skirmish::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting Skirmish server");
    info!(
        tick_rate_hz = config.tick_rate_hz,
        idle_timeout_ms = config.idle_timeout.as_millis() as u64,
        respawn_delay_ms = config.respawn_delay.as_millis() as u64,
        "World settings"
    );

    let addr = config.server_addr;
    let (state, world) = AppState::new(config);
    let mut world_task = tokio::spawn(world.run());

    let router = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());

    tokio::select! {
        served = server.into_future() => {
            served?;
            world_task.abort();
        }
        stopped = &mut world_task => {
            error!(result = ?stopped, "World task exited, shutting down");
            anyhow::bail!("world task exited unexpectedly");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
