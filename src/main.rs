use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use maintenance_contracts::config::{self, EngineSettings};
use maintenance_contracts::contracts::{
    scheduler, ContractService, HttpInvoiceIssuer, HttpNotifier, InvoiceIssuer, Notifier,
    PgContractStore, TracingNotifier,
};
use maintenance_contracts::routes::api_routes;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

async fn root() -> &'static str {
    "Maintenance Contracts API"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config::DATABASE_URL.as_str())
        .await?;

    // Run migrations if available
    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    let settings = EngineSettings::from_env();
    let invoices: Arc<dyn InvoiceIssuer> = Arc::new(HttpInvoiceIssuer::new(
        config::INVOICE_ISSUER_URL.as_str(),
        config::INVOICE_ISSUER_TOKEN.clone(),
        settings.collaborator_timeout,
    )?);
    let notifier: Arc<dyn Notifier> = match config::NOTIFIER_URL.as_deref() {
        Some(url) => Arc::new(HttpNotifier::new(
            url,
            config::NOTIFIER_TOKEN.clone(),
            settings.collaborator_timeout,
        )?),
        None => {
            tracing::info!("NOTIFIER_URL not set; renewal notices are only logged");
            Arc::new(TracingNotifier)
        }
    };
    let engine = ContractService::new(
        Arc::new(PgContractStore::new(pool.clone())),
        invoices,
        notifier,
        settings,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeps = scheduler::spawn(
        engine.clone(),
        Duration::from_secs(*config::CONTRACT_SWEEP_INTERVAL_SECS),
        shutdown_rx,
    );

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(engine));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::warn!(?error, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received; stopping contract sweeps");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(error) = sweeps.await {
        tracing::warn!(?error, "contract sweep task ended abnormally");
    }

    Ok(())
}
