//! Rollcall HTTP server.
//!
//! Volunteer registration API backed by `PostgreSQL`, with a Prometheus
//! scrape endpoint on a separate listener.

mod config;

use anyhow::Context;
use axum::{Router, routing::get};
use config::Config;
use rollcall_core::environment::SystemClock;
use rollcall_postgres::PostgresRegistrationStore;
use rollcall_runtime::RegistrationWorkflow;
use rollcall_runtime::metrics::MetricsExporter;
use rollcall_web::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rollcall=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rollcall server");

    let config = Config::from_env();
    info!(
        address = %config.server.address(),
        metrics_address = %config.server.metrics_address(),
        max_connections = config.database.max_connections,
        "Configuration loaded"
    );

    let mut exporter = MetricsExporter::new();
    exporter.install().context("Failed to install metrics recorder")?;
    spawn_metrics_server(&config.server.metrics_address(), exporter).await?;

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = PostgresRegistrationStore::new(pool);
    store.migrate().await.context("Failed to run migrations")?;
    info!("Database ready");

    let workflow = RegistrationWorkflow::new(Arc::new(store), Arc::new(SystemClock))
        .with_retry_policy(config.workflow.retry_policy());
    let app = rollcall_web::router(AppState::new(Arc::new(workflow)));

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = stop_rx.await;
    });
    let mut server = tokio::spawn(serve.into_future());

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")??;
            return Ok(());
        },
        () = shutdown_signal() => {},
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(config.server.shutdown_timeout(), server).await {
        Ok(result) => result.context("Server task failed")??,
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout,
            "Shutdown timeout elapsed, dropping open connections"
        ),
    }

    info!("Server stopped");
    Ok(())
}

/// Serve `/metrics` in Prometheus text format on its own listener.
async fn spawn_metrics_server(addr: &str, exporter: MetricsExporter) -> anyhow::Result<()> {
    let exporter = Arc::new(exporter);
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let exporter = Arc::clone(&exporter);
            async move { exporter.render().unwrap_or_default() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener {addr}"))?;
    info!(address = %addr, "Metrics endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server failed");
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
