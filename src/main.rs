//! Demo server: a small axum application instrumented with the
//! transaction layer.
//!
//! Tracer events are drained to the log; a real deployment would hand them
//! to the collector transport instead.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::Path;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::timeout::TimeoutLayer;

use apm_http::config::{load_config, AgentConfig};
use apm_http::middleware::{internal_error_responder, ApmLayer};
use apm_http::observability::logging;
use apm_http::tracer::{Tracer, TracerEvent};

#[derive(Debug, Parser)]
#[command(name = "apm-http", about = "Demo server with transaction instrumentation")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured sample ratio.
    #[arg(long)]
    sample_ratio: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    if let Some(ratio) = args.sample_ratio {
        config.sample_ratio = ratio;
    }

    tracing::info!(
        service_name = %config.service_name,
        sample_ratio = config.sample_ratio,
        "Configuration loaded"
    );

    let (tracer, mut events) = Tracer::new(&config);

    // Drain tracer events to the log in place of a collector transport.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TracerEvent::Transaction(tx) => {
                    tracing::info!(
                        id = %tx.id,
                        name = %tx.name,
                        result = %tx.result,
                        duration_ms = tx.duration.map(|d| d.as_millis() as u64),
                        sampled = tx.sampled(),
                        "transaction"
                    );
                    if tx.sampled() {
                        tracing::debug!(
                            context = %serde_json::to_string(&tx.context).unwrap_or_default(),
                            "transaction context"
                        );
                    }
                }
                TracerEvent::Error(report) => tracing::warn!(
                    id = %report.id,
                    transaction_id = %report.transaction_id,
                    culprit = %report.culprit,
                    message = %report.message,
                    "error report"
                ),
            }
        }
    });

    let apm = ApmLayer::new(tracer, &config).with_panic_responder(internal_error_responder());

    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .route("/users/{id}", get(user))
        .route("/boom", get(boom))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(apm);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(address = %args.bind, "HTTP server starting");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn user(Path(id): Path<String>) -> String {
    format!("user {id}")
}

async fn boom() -> &'static str {
    panic!("boom");
}
