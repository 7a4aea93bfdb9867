//! Headless bot client
//!
//! Connects to a server, runs the full client frame loop against a flat
//! ground plane, and wanders in circles, jumping and firing now and then.
//! Useful for load-testing a server and for watching the sync traffic.

use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use skirmish::client::{ClientApp, ClientConfig, ConnectionState, FrameInput, WsTransport};
use skirmish::sim::{GroundPlane, MovementInput};
use skirmish::util::logging::init_tracing;

const FRAME_RATE_HZ: u64 = 60;
const JUMP_EVERY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env()?;
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    init_tracing(&log_level);

    info!(url = %config.server_url, "Starting bot");

    let transport = WsTransport::new(tokio::runtime::Handle::current());
    let mut app = ClientApp::new(transport, GroundPlane::new(0.0), config);
    app.connect();

    let mut frames = interval(Duration::from_micros(1_000_000 / FRAME_RATE_HZ));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_frame = Instant::now();
    let mut last_jump = last_frame;
    let mut last_report = last_frame;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = frames.tick() => {}
            _ = &mut shutdown => {
                info!("Received Ctrl+C, stopping bot");
                break;
            }
        }

        let now = Instant::now();
        let delta = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let jump = now.duration_since(last_jump) >= JUMP_EVERY;
        if jump {
            last_jump = now;
        }
        let input = FrameInput {
            movement: MovementInput {
                forward: 1.0,
                yaw_delta: 0.6 * delta,
                jump_pressed: jump,
                ..MovementInput::default()
            },
            fire: !app.remotes().is_empty(),
        };

        app.frame(now, delta, &input);

        if app.connection().state() == ConnectionState::Disconnected {
            warn!("Connection given up, stopping bot");
            break;
        }

        if now.duration_since(last_report) >= Duration::from_secs(5) {
            last_report = now;
            info!(
                id = ?app.local_id(),
                health = app.health(),
                remotes = app.remotes().len(),
                projectiles = app.projectiles().len(),
                position = ?app.controller().position(),
                "Bot status"
            );
        }
    }

    app.connection_mut().disconnect();
    Ok(())
}
