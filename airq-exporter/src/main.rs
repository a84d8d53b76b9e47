// AirQ Exporter - Prometheus exporter for station air quality
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AirQ Exporter
//!
//! Polls a vendor sensor API for every registered station, computes the
//! Air Quality Index and exposes everything as Prometheus metrics.
//!
//! ## Usage
//!
//! ```bash
//! # API credentials from the environment (or a .env file)
//! API_URL=https://sensors.example/api/tags API_KEY=... airq-exporter
//!
//! # Custom registry, port and polling interval
//! airq-exporter --stations stations.json --port 9090 --interval 60
//! ```

mod collector;
mod config;
mod metrics;
mod sensor;

use airq::{AqiError, EngineConfig, IndexContext};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use clap::Parser;
use collector::{Collector, CollectorStatus};
use config::StationRegistry;
use metrics::{encode_metrics, PrometheusSink};
use sensor::HttpSensorClient;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// AirQ Prometheus Exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "EXPORTER_PORT", default_value = "9100")]
    port: u16,

    /// Station registry (JSON)
    #[arg(short, long, env = "STATIONS_CONFIG_FILE", default_value = "config.json")]
    stations: PathBuf,

    /// Sensor API endpoint
    #[arg(long, env = "API_URL")]
    api_url: String,

    /// Sensor API key, sent as Basic authorization
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// Polling interval in seconds
    #[arg(
        short,
        long,
        env = "API_UPDATE_INTERVAL_SEC",
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// AQI breakpoint table (CSV); the built-in table is used when absent
    #[arg(long, env = "AQI_TABLE_FILE")]
    breakpoints: Option<PathBuf>,

    /// Engine configuration (JSON): horizons, unit scales, threshold
    #[arg(long, env = "ENGINE_CONFIG_FILE")]
    engine_config: Option<PathBuf>,

    /// AQI at or above which a station is flagged abnormal
    #[arg(long)]
    abnormal_threshold: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Application state shared across handlers.
struct AppState {
    status: Arc<CollectorStatus>,
    station_count: usize,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" | "critical" => Level::ERROR,
            _ => Level::WARN,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("AirQ Exporter v{}", env!("CARGO_PKG_VERSION"));

    // Everything below must load before serving
    let context = match load_context(&args) {
        Ok(context) => context,
        Err(e) => {
            error!("Failed to load AQI engine: {}", e);
            std::process::exit(1);
        }
    };

    let registry = match StationRegistry::from_file(&args.stations) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to load stations from {}: {}", args.stations.display(), e);
            std::process::exit(1);
        }
    };
    info!(
        "Loaded {} stations ({} up) from {}",
        registry.len(),
        registry.up_count(),
        args.stations.display()
    );

    let client = match HttpSensorClient::new(args.api_url.clone(), args.api_key.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build sensor client: {}", e);
            std::process::exit(1);
        }
    };

    let station_count = registry.len();
    let collector = Collector::new(
        context,
        registry,
        Arc::new(client),
        Arc::new(PrometheusSink),
        Duration::from_secs(args.interval),
    );
    let status = collector.status();

    // Start collection in background
    tokio::spawn(collector.run());

    // Create app state
    let state = Arc::new(AppState {
        status: Arc::clone(&status),
        station_count,
        start_time: std::time::Instant::now(),
    });

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(status))
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Engine config from file (or defaults), CLI threshold override, then the table.
fn load_context(args: &Args) -> Result<IndexContext, AqiError> {
    let mut config = match &args.engine_config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threshold) = args.abnormal_threshold {
        config = config.with_threshold(threshold);
    }

    match &args.breakpoints {
        Some(path) => {
            info!("Loading breakpoint table from {}", path.display());
            IndexContext::from_path(config, path)
        }
        None => IndexContext::builtin(config),
    }
}

/// Resolves on Ctrl-C and stops the collector.
async fn shutdown_signal(status: Arc<CollectorStatus>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
    status.stop();
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>AirQ Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>AirQ Exporter</h1>
    <p>Prometheus exporter for station air quality readings and the Air Quality Index.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/ready">/ready</a> - Readiness check</div>
        <div class="endpoint"><a href="/status">/status</a> - Status information (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>air_quality_&lt;pollutant&gt;_&lt;unit&gt;</code> - Raw station readings</li>
        <li><code>air_quality_aqi</code> - Air Quality Index</li>
        <li><code>air_quality_subindex</code> - Per-indicator sub-index</li>
        <li><code>air_quality_risk_level</code> - Risk band ordinal</li>
        <li><code>air_quality_abnormal</code> - Abnormal flag (1=abnormal)</li>
        <li><code>air_quality_exporter_*</code> - Exporter self-metrics</li>
    </ul>
    <p>Missing values are reported as NaN.</p>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler: ready once the first cycle has published.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.status.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    running: bool,
    stations: usize,
    cycles: u64,
    fetch_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_cycle: Option<String>,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let last_cycle_ms = state.status.last_cycle_ms.load(Ordering::SeqCst);
    let last_cycle = if last_cycle_ms > 0 {
        i64::try_from(last_cycle_ms)
            .ok()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|t| t.to_rfc3339())
    } else {
        None
    };

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        running: state.status.running.load(Ordering::SeqCst),
        stations: state.station_count,
        cycles: state.status.cycles.load(Ordering::SeqCst),
        fetch_errors: state.status.fetch_errors.load(Ordering::SeqCst),
        last_cycle,
    })
}
