use crate::infra::{AppState, Services};
use academy_ops::store::StateStore;
use academy_ops::workflows::dispatch::dispatch_router;
use academy_ops::workflows::prospects::prospect_router;
use academy_ops::workflows::sessions::session_router;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;

/// Workflow routers plus the operational endpoints.
pub(crate) fn app_router<S>(services: &Services<S>) -> axum::Router
where
    S: StateStore + 'static,
{
    session_router(services.sessions.clone())
        .merge(prospect_router(services.prospects.clone()))
        .merge(dispatch_router(services.engine.clone()))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
