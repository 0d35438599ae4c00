use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::aggregate::SessionId;
use super::catalog::RuleCatalog;
use super::domain::{Formation, SessionError};
use super::invitation::{InvitationError, InvitationId, ResponseChoice};
use super::service::{
    AttachJury, CustomDateRequest, NewSession, RespondResult, SessionService, SessionServiceError,
};
use crate::store::StateStore;
use crate::workflows::dispatch::JobEntry;

/// Operator API plus the public confirmation link.
pub fn session_router<S>(service: Arc<SessionService<S>>) -> Router
where
    S: StateStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/sessions",
            get(list_handler::<S>).post(create_handler::<S>),
        )
        .route(
            "/api/v1/sessions/:session_id",
            get(detail_handler::<S>).delete(delete_handler::<S>),
        )
        .route(
            "/api/v1/sessions/:session_id/steps/:index/toggle",
            post(toggle_handler::<S>),
        )
        .route(
            "/api/v1/sessions/:session_id/steps/:index/custom-date",
            put(custom_date_handler::<S>),
        )
        .route(
            "/api/v1/sessions/:session_id/invitations",
            post(attach_handler::<S>),
        )
        .route(
            "/api/v1/sessions/:session_id/invitations/notify",
            post(notify_handler::<S>),
        )
        .route(
            "/api/v1/sessions/:session_id/invitations/remind",
            post(remind_handler::<S>),
        )
        .route("/api/v1/catalog/:formation", get(catalog_handler))
        .route(
            "/invitation/:session_id/:invitation_id/:choice",
            get(respond_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DispatchRequest {
    #[serde(default)]
    invitation_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenQuery {
    #[serde(default)]
    token: String,
}

fn status_for(error: &SessionServiceError) -> StatusCode {
    match error {
        SessionServiceError::NotFound(_)
        | SessionServiceError::Session(SessionError::StepOutOfRange { .. })
        | SessionServiceError::Session(SessionError::InvitationNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        SessionServiceError::Invitation(InvitationError::InvalidToken) => StatusCode::FORBIDDEN,
        SessionServiceError::Invitation(_) => StatusCode::CONFLICT,
        SessionServiceError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: SessionServiceError) -> Response {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "session request failed");
    }
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

/// Store calls block on file I/O, so handlers run them on the blocking pool.
async fn blocking<T, F>(action: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SessionServiceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(action).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error_response(error)),
        Err(error) => {
            tracing::error!(error = %error, "session request aborted");
            let payload = json!({ "error": "session request aborted" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response())
        }
    }
}

pub(crate) async fn list_handler<S>(State(service): State<Arc<SessionService<S>>>) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.list_sessions(Utc::now())).await {
        Ok(sessions) => (StatusCode::OK, axum::Json(sessions)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn create_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    axum::Json(request): axum::Json<NewSession>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.create_session(request, Utc::now())).await {
        Ok(detail) => (StatusCode::CREATED, axum::Json(detail)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn detail_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.get_session(&SessionId(session_id), Utc::now())).await {
        Ok(detail) => (StatusCode::OK, axum::Json(detail)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn delete_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.delete_session(&SessionId(session_id))).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn toggle_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path((session_id, index)): Path<(String, usize)>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.toggle_step(&SessionId(session_id), index, Utc::now())).await {
        Ok(detail) => (StatusCode::OK, axum::Json(detail)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn custom_date_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path((session_id, index)): Path<(String, usize)>,
    axum::Json(request): axum::Json<CustomDateRequest>,
) -> Response
where
    S: StateStore + 'static,
{
    let update = move || {
        service.set_custom_date(
            &SessionId(session_id),
            index,
            request.custom_date,
            Utc::now(),
        )
    };
    match blocking(update).await {
        Ok(detail) => (StatusCode::OK, axum::Json(detail)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn attach_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<AttachJury>,
) -> Response
where
    S: StateStore + 'static,
{
    match blocking(move || service.attach_jury(&SessionId(session_id), request)).await {
        Ok(jury) => (StatusCode::CREATED, axum::Json(jury)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn notify_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<DispatchRequest>,
) -> Response
where
    S: StateStore + 'static,
{
    run_dispatch(service, session_id, request, |service, id, ids| {
        service.notify(id, ids, Utc::now())
    })
    .await
}

pub(crate) async fn remind_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<DispatchRequest>,
) -> Response
where
    S: StateStore + 'static,
{
    run_dispatch(service, session_id, request, |service, id, ids| {
        service.remind(id, ids, Utc::now())
    })
    .await
}

/// Sends block on the channels, so the dispatch runs on the blocking pool.
async fn run_dispatch<S, F>(
    service: Arc<SessionService<S>>,
    session_id: String,
    request: DispatchRequest,
    action: F,
) -> Response
where
    S: StateStore + 'static,
    F: FnOnce(
            &SessionService<S>,
            &SessionId,
            &[InvitationId],
        ) -> Result<Vec<JobEntry>, SessionServiceError>
        + Send
        + 'static,
{
    let id = SessionId(session_id);
    let ids: Vec<InvitationId> = request
        .invitation_ids
        .into_iter()
        .map(InvitationId)
        .collect();

    match tokio::task::spawn_blocking(move || action(service.as_ref(), &id, ids.as_slice())).await {
        Ok(Ok(entries)) => {
            let mut digest = String::new();
            for entry in &entries {
                digest.push_str(&entry.to_string());
                digest.push('\n');
            }
            if entries.is_empty() {
                digest.push_str("no juries attached\n");
            }
            (StatusCode::OK, digest).into_response()
        }
        Ok(Err(error)) => (status_for(&error), format!("{error}\n")).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "jury dispatch aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, "jury dispatch aborted\n").into_response()
        }
    }
}

pub(crate) async fn catalog_handler(Path(formation): Path<String>) -> Response {
    let Some(formation) = Formation::from_code(&formation) else {
        let payload = json!({
            "error": format!("unknown formation '{formation}'"),
        });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    };
    let catalog = RuleCatalog::for_formation(formation);
    let rules: Vec<_> = catalog
        .rules()
        .iter()
        .map(|rule| {
            json!({
                "name": rule.name,
                "rule": rule.due.describe(),
            })
        })
        .collect();
    let payload = json!({
        "formation": formation.code(),
        "label": formation.label(),
        "base_price": formation.base_price(),
        "rules": rules,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn respond_handler<S>(
    State(service): State<Arc<SessionService<S>>>,
    Path((session_id, invitation_id, choice)): Path<(String, String, String)>,
    Query(query): Query<TokenQuery>,
) -> Response
where
    S: StateStore + 'static,
{
    let choice = match choice.parse::<ResponseChoice>() {
        Ok(choice) => choice,
        Err(error) => {
            return (StatusCode::BAD_REQUEST, page("Invalid answer", &error.to_string()))
                .into_response()
        }
    };

    let answer = move || {
        service.respond(
            &SessionId(session_id),
            &InvitationId(invitation_id),
            &query.token,
            choice,
            Utc::now(),
        )
    };
    let result = match tokio::task::spawn_blocking(answer).await {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(error = %error, "confirmation aborted");
            let message = "Your answer could not be recorded, please try again later.";
            return (StatusCode::INTERNAL_SERVER_ERROR, page("Jury confirmation", message))
                .into_response();
        }
    };

    match result {
        Ok(result) => (StatusCode::OK, confirmation_page(&result)).into_response(),
        Err(error) => {
            let status = status_for(&error);
            let message = match status {
                StatusCode::FORBIDDEN => "This confirmation link is not valid.".to_string(),
                StatusCode::NOT_FOUND => "This invitation no longer exists.".to_string(),
                _ => {
                    tracing::error!(error = %error, "confirmation failed");
                    "Your answer could not be recorded, please try again later.".to_string()
                }
            };
            (status, page("Jury confirmation", &message)).into_response()
        }
    }
}

fn confirmation_page(result: &RespondResult) -> Html<String> {
    let answer = match result.outcome.status.label() {
        "present" => "you will attend",
        "absent" => "you will not attend",
        other => other,
    };
    let message = if result.outcome.changed {
        format!(
            "Thank you {}. We have recorded that {answer} the exam jury for {}.",
            result.jury_name, result.session_name
        )
    } else {
        format!(
            "Thank you {}. Your answer was already recorded: {answer} the exam jury for {}.",
            result.jury_name, result.session_name
        )
    };
    page("Jury confirmation", &message)
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>\n",
        escape_html(message),
        title = escape_html(title),
    ))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
