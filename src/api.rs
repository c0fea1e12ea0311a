use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Sse,
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tokio::sync::broadcast::error::RecvError;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    error::AttendanceError,
    manager::CreateSession,
    rate_limiter::{rate_limit_middleware, RateLimiter},
    rotator,
    state::AppState,
};

#[derive(Clone)]
pub struct AppContext {
    pub state: AppState,
    pub config: Config,
    pub rate_limiter: RateLimiter,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    subject_name: String,
    #[serde(default)]
    total_students: u32,
    /// Accepted as a JSON number or a numeric string; form front ends are
    /// sloppy about this, so the parse happens here at the boundary.
    #[serde(default)]
    ttl_seconds: Option<Value>,
    #[serde(default)]
    admin_uid: Option<String>,
    /// When set, this server runs the rotation loop for the session
    /// instead of the creator's client driving it.
    #[serde(default)]
    auto_rotate: bool,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RotateRequest {
    #[serde(default)]
    ttl_seconds: Option<Value>,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    token: String,
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_page_size")]
    page_size: usize,
}

fn default_page_size() -> usize {
    10
}

/// Best-effort numeric coercion for TTL fields arriving over the wire.
/// Anything non-positive or unparseable becomes `None` and the session
/// defaults apply downstream.
fn parse_ttl(raw: &Option<Value>) -> Option<u32> {
    let value = raw.as_ref()?;
    let ttl = match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    ttl.filter(|t| *t > 0)
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Scanmark Attendance API", version = "1.0.0"),
    paths(
        health_check,
        create_session,
        list_sessions,
        get_session,
        rotate_token,
        end_session,
        submit_attendance,
        list_attendance,
        session_events,
    ),
    components(schemas(
        crate::session::Session,
        crate::session::AttendanceEntry,
        crate::SubmitOutcome,
    ))
)]
struct ApiDoc;

pub fn create_api_router(context: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            context
                .config
                .server
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::CACHE_CONTROL,
        ]);

    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/rotate", post(rotate_token))
        .route("/sessions/{id}/end", post(end_session))
        .route(
            "/sessions/{id}/attendance",
            post(submit_attendance).get(list_attendance),
        )
        .route("/sessions/{id}/events", get(session_events))
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(context.rate_limiter.clone()))
        .layer(cors)
        .with_state(context)
}

fn error_response(err: &AttendanceError) -> (StatusCode, Json<Value>) {
    match err {
        AttendanceError::NotFound => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": "not-found" })))
        }
        AttendanceError::InvalidOrExpired => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid-or-expired" })),
        ),
        AttendanceError::Store(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "store-unavailable" })),
        ),
    }
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "Sessions",
    responses((status = 200, description = "Session created; returns id and initial token"))
)]
async fn create_session(
    State(context): State<AppContext>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let created = context
        .state
        .manager
        .create_session(CreateSession {
            subject_name: req.subject_name,
            total_students: req.total_students,
            ttl_seconds: parse_ttl(&req.ttl_seconds),
            created_by: req.admin_uid,
        })
        .await
        .map_err(|e| error_response(&e))?;

    if req.auto_rotate {
        let handle = rotator::spawn_rotation(context.state.manager.clone(), created.id.clone());
        context.state.rotations.insert(created.id.clone(), handle);
    }

    Ok(Json(json!({ "id": created.id, "token": created.token })))
}

#[utoipa::path(
    get,
    path = "/sessions",
    tag = "Sessions",
    responses((status = 200, description = "Recent sessions, newest first", body = [crate::session::Session]))
)]
async fn list_sessions(
    State(context): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sessions = context
        .state
        .manager
        .list_sessions(query.page_size)
        .await
        .map_err(|e| error_response(&e))?;

    let count = sessions.len();
    Ok(Json(json!({ "sessions": sessions, "count": count })))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "Sessions",
    responses(
        (status = 200, description = "Full session snapshot", body = crate::session::Session),
        (status = 404, description = "Unknown session")
    )
)]
async fn get_session(
    State(context): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let session = context
        .state
        .manager
        .get_session(&id)
        .await
        .map_err(|e| error_response(&e))?
        .ok_or_else(|| error_response(&AttendanceError::NotFound))?;

    Ok(Json(json!(session)))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/rotate",
    tag = "Sessions",
    responses(
        (status = 200, description = "Fresh token installed"),
        (status = 404, description = "Unknown session")
    )
)]
async fn rotate_token(
    State(context): State<AppContext>,
    Path(id): Path<String>,
    Json(req): Json<RotateRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let token = context
        .state
        .manager
        .rotate_token(&id, parse_ttl(&req.ttl_seconds))
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({ "token": token })))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "Sessions",
    responses(
        (status = 200, description = "Session ended (idempotent)"),
        (status = 404, description = "Unknown session")
    )
)]
async fn end_session(
    State(context): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    context
        .state
        .manager
        .end_session(&id)
        .await
        .map_err(|e| error_response(&e))?;

    context.state.stop_rotation(&id);
    Ok(Json(json!({ "ok": true })))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/attendance",
    tag = "Attendance",
    responses(
        (status = 200, description = "Submission processed", body = crate::SubmitOutcome),
        (status = 400, description = "Token invalid or expired"),
        (status = 404, description = "Unknown session")
    )
)]
async fn submit_attendance(
    State(context): State<AppContext>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let outcome = context
        .state
        .validator
        .submit(&id, &req.token, &req.user_id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({ "ok": true, "outcome": outcome })))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/attendance",
    tag = "Attendance",
    responses((status = 200, description = "Accepted scans, newest first", body = [crate::session::AttendanceEntry]))
)]
async fn list_attendance(
    State(context): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let entries = context
        .state
        .list_attendance(&id)
        .await
        .map_err(|e| error_response(&e))?;

    let count = entries.len();
    Ok(Json(json!({ "entries": entries, "count": count })))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "Attendance",
    responses((status = 200, description = "Server-sent stream of session snapshots"))
)]
async fn session_events(
    State(context): State<AppContext>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = context.state.events.subscribe();

    let stream = stream::unfold(
        (receiver, context, id),
        |(mut rx, context, id)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.session_id() == id => {
                        let snapshot = context.state.manager.get_session(&id).await.ok().flatten();
                        let data = serde_json::to_string(&snapshot).unwrap_or_default();
                        let sse_event = axum::response::sse::Event::default().data(data);
                        return Some((Ok(sse_event), (rx, context, id)));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    );

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(30))
            .text("keep-alive"),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is up"))
)]
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now()
    }))
}
