//! LED Matrix drawing server
//!
//! Runs a web server on the Pi that accepts API-key protected requests to
//! draw rectangles, images and scrolling text on the LED matrix.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the matrix sink, processes commands
//! - **HTTP server** (tokio/axum): validates requests, sends commands via channel
//!
//! ## Usage
//! ```sh
//! sudo API_KEY=change-me ./target/release/led-controller --assets-dir /opt/led
//! ```
//! Without the `hardware` feature, or with `--headless`, frames are rendered
//! into memory instead of a panel.

use anyhow::Context;
use clap::Parser;
use led_controller::config::{Args, ServerConfig};
use led_controller::render::{self, DisplayStatus, RenderCommand};
use led_controller::server::{self, AppState};
use led_controller::sink::MemorySink;
use led_controller::{MatrixConfig, is_running, setup_signal_handler};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_args(args).context("invalid configuration")?;

    config.assets_dir = config.assets_dir.canonicalize().unwrap_or_else(|_| {
        tracing::warn!("Could not canonicalize assets dir, using as-is");
        config.assets_dir.clone()
    });

    tracing::info!("LED Controller v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Matrix: {}x{} ({} mapping, brightness {})",
        config.matrix.width(),
        config.matrix.height(),
        config.matrix.hardware_mapping(),
        config.matrix.brightness()
    );
    tracing::info!("Assets dir: {}", config.assets_dir.display());

    let running = setup_signal_handler().context("failed to install Ctrl+C handler")?;

    let (tx, rx) = mpsc::channel();
    let status = Arc::new(Mutex::new(DisplayStatus::new(config.matrix.brightness())));
    let render_handle = spawn_renderer(&config, rx, status.clone());

    let app_state = AppState {
        command_tx: tx,
        status,
        assets_dir: config.assets_dir.clone(),
        matrix: config.matrix.clone(),
    };
    let app = server::create_router(app_state, config.auth.clone());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(running))
        .await
        .context("server error")?;

    // The router (and with it the last command sender) is gone now, so the
    // render thread sees the channel close, blanks the panel and exits.
    tracing::info!("Shutting down, waiting for render thread...");
    tokio::task::spawn_blocking(move || render_handle.join())
        .await?
        .map_err(|_| anyhow::anyhow!("render thread panicked"))?;

    Ok(())
}

/// Resolves once Ctrl+C has flipped the running flag.
async fn shutdown_signal(running: Arc<AtomicBool>) {
    while is_running(&running) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn spawn_headless(
    matrix: &MatrixConfig,
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
    tick: Duration,
) -> JoinHandle<()> {
    let (width, height) = (matrix.width(), matrix.height());
    tracing::info!("Headless mode: rendering {}x{} frames into memory", width, height);
    render::spawn(move || Ok(MemorySink::new(width, height)), rx, status, tick)
}

#[cfg(feature = "hardware")]
fn spawn_renderer(
    config: &ServerConfig,
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
) -> JoinHandle<()> {
    use led_controller::hardware::LedSink;

    if config.headless {
        return spawn_headless(&config.matrix, rx, status, config.tick);
    }
    let matrix = config.matrix.clone();
    render::spawn(move || LedSink::open(&matrix), rx, status, config.tick)
}

#[cfg(not(feature = "hardware"))]
fn spawn_renderer(
    config: &ServerConfig,
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
) -> JoinHandle<()> {
    if !config.headless {
        tracing::warn!("Built without the 'hardware' feature; running headless");
    }
    spawn_headless(&config.matrix, rx, status, config.tick)
}
