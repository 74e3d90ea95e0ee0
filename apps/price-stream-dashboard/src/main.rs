//! Price Stream Dashboard Binary
//!
//! Starts the dashboard server and, once asked to, the polling pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream-dashboard
//! curl -X POST localhost:8080/stream/start
//! curl localhost:8080/chart
//! ```
//!
//! # Environment Variables
//!
//! - `DASHBOARD_POLL_INTERVAL_MS`: tick interval (default: 100)
//! - `DASHBOARD_MERGE_POLICY`: pairwise | `running_mean` (default: pairwise)
//! - `DASHBOARD_FEED`: simulated | http (default: simulated)
//! - `DASHBOARD_FEED_URL`: endpoint for the HTTP feed
//! - `DASHBOARD_FEED_TIMEOUT_MS`: HTTP feed timeout (default: 2000)
//! - `DASHBOARD_SIM_STOCKS`: comma-separated stocks (default: ABC,DEF)
//! - `DASHBOARD_SIM_SEED`: random walk seed (default: entropy)
//! - `DASHBOARD_SIM_DUPLICATE_PROBABILITY`: default 0.3
//! - `DASHBOARD_SIM_MISSING_SIDE_PROBABILITY`: default 0.05
//! - `DASHBOARD_HTTP_PORT`: dashboard port (default: 8080)
//! - `DASHBOARD_AUTO_START`: start streaming at boot (default: false)
//! - `RUST_LOG`: log filter (default: `price_stream_dashboard=info`)

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use price_stream_dashboard::infrastructure::telemetry;
use price_stream_dashboard::{
    ChartBoard, DashboardConfig, DashboardServer, DashboardServerState, ViewController,
    build_data_source, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    telemetry::init();

    tracing::info!("Starting Price Stream Dashboard");

    let _metrics_handle = init_metrics();

    let config = DashboardConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let source = build_data_source(&config.feed)?;
    let board = ChartBoard::new();
    let controller = Arc::new(Mutex::new(ViewController::new(
        source,
        Arc::new(board.clone()),
        config.poll.interval,
        config.poll.merge_policy,
    )));

    if config.auto_start {
        controller.lock().show_and_stream();
    }

    let server_state = Arc::new(DashboardServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&controller),
        board,
    ));
    let server = DashboardServer::new(
        config.server.http_port,
        server_state,
        shutdown_token.clone(),
    );

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Dashboard server error");
        }
    });

    tracing::info!("Dashboard ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Dashboard server did not stop in time"
        );
    }

    controller.lock().shutdown();
    drop(controller);

    tracing::info!("Dashboard stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &DashboardConfig) {
    tracing::info!(
        interval_ms = config.poll.interval.as_millis(),
        merge_policy = config.poll.merge_policy.as_str(),
        feed = config.feed.kind.as_str(),
        http_port = config.server.http_port,
        auto_start = config.auto_start,
        "Configuration loaded"
    );
    tracing::debug!(
        feed_url = ?config.feed.url,
        stocks = ?config.feed.simulated.stocks,
        seed = ?config.feed.simulated.seed,
        "Feed settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
