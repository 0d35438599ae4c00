use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;

use super::engine::{DispatchEngine, TickOutcome};
use crate::store::StateStore;

/// Exposes the manual tick used by external cron pingers.
pub fn dispatch_router<S>(engine: Arc<DispatchEngine<S>>) -> Router
where
    S: StateStore + 'static,
{
    Router::new()
        .route("/cron-check", get(cron_check_handler::<S>))
        .with_state(engine)
}

pub(crate) async fn cron_check_handler<S>(State(engine): State<Arc<DispatchEngine<S>>>) -> Response
where
    S: StateStore + 'static,
{
    match tokio::task::spawn_blocking(move || engine.tick(Utc::now())).await {
        Ok(outcome @ TickOutcome::Failed(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, outcome.to_string()).into_response()
        }
        Ok(outcome) => (StatusCode::OK, outcome.to_string()).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "cron-check tick aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, "dispatch tick aborted\n").into_response()
        }
    }
}
