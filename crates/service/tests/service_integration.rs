//! Integration tests for the service host.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{
    DispatchStats, InMemoryClientDirectory, InMemoryMailTransport, InMemoryPaymentGateway,
};
use domain::{
    CartRepositoryExt, ClientSnapshot, InMemoryCartRepository, Money, ProductId, UserId,
};
use ledger::{InMemoryStockLedger, Product, StockLedgerExt};
use metrics_exporter_prometheus::PrometheusHandle;
use service::config::Config;
use service::{Engine, StoreKind};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn body_string(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_check_reports_store() {
    let app = service::create_app(StoreKind::Memory, get_metrics_handle());

    let response = get(app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let handle = get_metrics_handle();
    metrics::counter!("service_test_counter_total").increment(1);
    let app = service::create_app(StoreKind::Postgres, handle);

    let response = get(app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    assert!(body_string(response).await.contains("service_test_counter_total"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = service::create_app(StoreKind::Memory, get_metrics_handle());
    let response = get(app, "/orders").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_engine_runs_checkout_and_drains_mail_on_shutdown() {
    let handle = get_metrics_handle();
    let manager = UserId::new();
    let ledger = Arc::new(
        InMemoryStockLedger::with_products([Product::new("P1", "Lamp", 4, manager)]).await,
    );
    let carts = Arc::new(InMemoryCartRepository::new());
    let clients = InMemoryClientDirectory::new();
    let mail = Arc::new(InMemoryMailTransport::new());
    let user = UserId::new();
    clients
        .upsert(user, ClientSnapshot::new("Ana", "ana@example.com", "Calle Mayor 1"))
        .await;

    let config = Config {
        reclaim_interval: Duration::from_secs(3600),
        ..Config::default()
    };
    let engine = Engine::start(
        Arc::clone(&carts),
        Arc::clone(&ledger),
        InMemoryPaymentGateway::new(),
        clients,
        Arc::clone(&mail),
        &config,
    );

    let cart = engine.carts.cart_for_user(user).await.unwrap();
    engine
        .carts
        .add_line(cart.id(), ProductId::new("P1"), 3, Money::from_cents(1999))
        .await
        .unwrap();
    engine.checkout.checkout(cart.id()).await.unwrap();
    engine.checkout.confirm_purchase(cart.id()).await.unwrap();

    let stats = engine.shutdown().await;
    assert_eq!(stats, DispatchStats { sent: 1, failed: 0 });
    assert_eq!(mail.sent().await.len(), 1);
    assert_eq!(ledger.stock_of(&ProductId::new("P1")).await.unwrap(), Some(1));
    assert!(carts.get(cart.id()).await.unwrap().is_purchased());

    let app = service::create_app(StoreKind::Memory, handle);
    let scrape = body_string(get(app, "/metrics").await).await;
    assert!(scrape.contains("checkout_started_total"));
}
