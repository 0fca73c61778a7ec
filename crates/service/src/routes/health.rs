//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::StoreKind;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: StoreKind,
}

/// GET /health: reports liveness and which store backs the engine.
pub async fn check(State(store): State<StoreKind>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store,
    })
}
