//! Process host for the checkout engine.
//!
//! Wires the stores, the checkout components and the two background tasks
//! (expiry reclaimer and notification dispatcher), and serves the health and
//! Prometheus endpoints.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use checkout::{
    CheckoutCoordinator, CheckoutExpiryReclaimer, ClientDirectory, DispatchStats,
    DispatcherHandle, MailTransport, NotificationDispatcher, PaymentGateway, ReclaimerHandle,
    SaleLineLifecycle,
};
use domain::{CartRepository, CartService, StockRetryPolicy};
use ledger::StockLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use config::Config;

/// Storage backend the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Postgres,
}

/// Creates the Axum router with the ops endpoints.
pub fn create_app(store: StoreKind, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(store)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// The running checkout engine.
///
/// The shopper, checkout and staff components are exposed for the calling
/// layer; the reclaimer and dispatcher run on their own tasks until
/// [`shutdown`](Self::shutdown).
pub struct Engine<R, L, P, C>
where
    R: CartRepository + 'static,
    L: StockLedger + 'static,
    P: PaymentGateway,
    C: ClientDirectory,
{
    pub carts: CartService<R, L>,
    pub checkout: Arc<CheckoutCoordinator<R, L, P, C>>,
    pub lifecycle: SaleLineLifecycle<R, L>,
    reclaimer: ReclaimerHandle,
    dispatcher: DispatcherHandle,
}

impl<R, L, P, C> Engine<R, L, P, C>
where
    R: CartRepository + 'static,
    L: StockLedger + 'static,
    P: PaymentGateway,
    C: ClientDirectory,
{
    /// Builds the components over shared stores and starts the background tasks.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start<M: MailTransport + 'static>(
        carts: Arc<R>,
        ledger: Arc<L>,
        payment: P,
        clients: C,
        mail: Arc<M>,
        config: &Config,
    ) -> Self {
        let policy =
            StockRetryPolicy::new(Arc::clone(&ledger)).with_max_attempts(config.stock_max_attempts);

        let (dispatcher, sender) = NotificationDispatcher::new(mail);
        let dispatcher = dispatcher.spawn();

        let reclaimer = CheckoutExpiryReclaimer::new(
            Arc::clone(&carts),
            Arc::clone(&ledger),
            config.reclaimer(),
        )
        .spawn();

        tracing::info!(
            max_attempts = policy.max_attempts(),
            "checkout engine started"
        );

        Self {
            carts: CartService::new(Arc::clone(&carts), ledger),
            checkout: Arc::new(CheckoutCoordinator::new(
                Arc::clone(&carts),
                policy.clone(),
                payment,
                clients,
                sender,
            )),
            lifecycle: SaleLineLifecycle::new(carts, policy),
            reclaimer,
            dispatcher,
        }
    }

    /// Stops the reclaimer, drains queued notifications, and reports delivery counts.
    pub async fn shutdown(self) -> DispatchStats {
        self.reclaimer.shutdown().await;
        let stats = self.dispatcher.shutdown().await;
        tracing::info!(
            sent = stats.sent,
            failed = stats.failed,
            "checkout engine stopped"
        );
        stats
    }
}
