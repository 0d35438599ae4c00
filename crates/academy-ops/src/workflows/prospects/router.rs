use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;

use super::domain::{NewProspect, ProspectId};
use super::service::{ProspectService, ProspectServiceError};
use crate::store::StateStore;

pub fn prospect_router<S>(service: Arc<ProspectService<S>>) -> Router
where
    S: StateStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/prospects",
            get(list_handler::<S>).post(register_handler::<S>),
        )
        .route("/api/v1/prospects/:prospect_id", get(get_handler::<S>))
        .with_state(service)
}

async fn blocking<T, F>(action: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProspectServiceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(action).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error_response(error)),
        Err(error) => {
            tracing::error!(error = %error, "prospect request aborted");
            let payload = json!({ "error": "prospect request aborted" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response())
        }
    }
}

pub(crate) async fn list_handler<S>(State(service): State<Arc<ProspectService<S>>>) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.list()).await {
        Ok(prospects) => (StatusCode::OK, axum::Json(prospects)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn register_handler<S>(
    State(service): State<Arc<ProspectService<S>>>,
    axum::Json(request): axum::Json<NewProspect>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.register(request)).await {
        Ok(prospect) => (StatusCode::CREATED, axum::Json(prospect)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn get_handler<S>(
    State(service): State<Arc<ProspectService<S>>>,
    Path(prospect_id): Path<String>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.get(&ProspectId(prospect_id))).await {
        Ok(prospect) => (StatusCode::OK, axum::Json(prospect)).into_response(),
        Err(response) => response,
    }
}

fn error_response(error: ProspectServiceError) -> Response {
    let status = match &error {
        ProspectServiceError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProspectServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ProspectServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
