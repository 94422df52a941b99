//! HTTP surface. Each domain module exposes a `router()` merged under
//! `/api/v1` by [`api_router`].

pub mod extensions;
pub mod loan_requests;
pub mod loans;
pub mod materials;

use crate::{ApiResponse, AppState};
use axum::{response::Json, routing::get, Router};
use serde_json::json;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(materials::router())
        .nest("/loan-requests", loan_requests::router())
        .nest("/loans", loans::router())
        .nest("/extensions", extensions::router())
}

pub async fn health() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(json!({ "status": "ok" })))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .with_state(state)
}
