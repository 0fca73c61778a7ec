//! Checkout service entry point.

use std::sync::Arc;

use checkout::{InMemoryClientDirectory, InMemoryMailTransport, InMemoryPaymentGateway};
use domain::{CartRepository, InMemoryCartRepository, PostgresCartRepository};
use ledger::{InMemoryStockLedger, PostgresStockLedger, StockLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use service::config::{Config, LogFormat};
use service::error::ServiceError;
use service::{Engine, StoreKind};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Runs the engine and the ops server until a shutdown signal arrives.
async fn serve<R, L>(
    config: &Config,
    store: StoreKind,
    carts: Arc<R>,
    ledger: Arc<L>,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServiceError>
where
    R: CartRepository + 'static,
    L: StockLedger + 'static,
{
    let engine = Engine::start(
        carts,
        ledger,
        InMemoryPaymentGateway::new(),
        InMemoryClientDirectory::new(),
        Arc::new(InMemoryMailTransport::new()),
        config,
    );

    let app = service::create_app(store, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, ?store, "starting checkout service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the stores and run
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let ledger = PostgresStockLedger::new(pool.clone());
            ledger.run_migrations().await?;
            tracing::info!("connected to PostgreSQL");

            serve(
                &config,
                StoreKind::Postgres,
                Arc::new(PostgresCartRepository::new(pool)),
                Arc::new(ledger),
                metrics_handle,
            )
            .await?;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            serve(
                &config,
                StoreKind::Memory,
                Arc::new(InMemoryCartRepository::new()),
                Arc::new(InMemoryStockLedger::new()),
                metrics_handle,
            )
            .await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
