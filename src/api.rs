use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::app::{App, FinishSession};
use crate::db::Snapshot;
use crate::models::{Answer, DiagnosticResult, ProfileUpdate, UsageCategory};

#[derive(Clone)]
pub struct ApiState {
    pub app: Arc<Mutex<App>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(e) => {
                log::error!("request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status != StatusCode::INTERNAL_SERVER_ERROR {
            log::warn!("rejected request: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/drill", get(next_batch))
        .route("/api/drill/grade", post(grade_answer))
        .route("/api/sessions", post(finish_session))
        .route("/api/diagnostics", post(record_diagnostic))
        .route("/api/dashboard", get(dashboard))
        .route("/api/profile", get(profile).put(update_profile))
        .route("/api/bundles/:id/review", post(review_bundle))
        .route("/api/export", get(export))
        .route("/api/import", post(import))
        .route("/api/data", delete(clear))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct DrillQuery {
    count: Option<usize>,
    focus: Option<String>,
    /// Comma separated item ids already shown in this session.
    used: Option<String>,
}

async fn next_batch(
    State(state): State<ApiState>,
    Query(query): Query<DrillQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let focus = query
        .focus
        .as_deref()
        .filter(|f| !f.is_empty())
        .map(str::parse::<UsageCategory>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let used: HashSet<String> = query
        .used
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let mut app = state.app.lock().await;
    let batch = app.next_batch(query.count, focus, &used).await?;
    Ok(Json(batch))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeRequest {
    item_id: String,
    answer: Answer,
}

async fn grade_answer(
    State(state): State<ApiState>,
    Json(payload): Json<GradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    app.grade(&payload.item_id, &payload.answer)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown item: {}", payload.item_id)))
}

async fn finish_session(
    State(state): State<ApiState>,
    Json(payload): Json<FinishSession>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    let session = app.finish_session(payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn record_diagnostic(
    State(state): State<ApiState>,
    Json(payload): Json<DiagnosticResult>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    let stored = app.record_diagnostic(payload).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn dashboard(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    Ok(Json(app.dashboard().await?))
}

async fn profile(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    Ok(Json(app.profile().await?))
}

async fn update_profile(
    State(state): State<ApiState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    Ok(Json(app.update_profile(update).await?))
}

#[derive(Deserialize)]
struct ReviewRequest {
    correct: bool,
}

async fn review_bundle(
    State(state): State<ApiState>,
    Path(bundle_id): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    app.review_bundle(&bundle_id, payload.correct)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown bundle: {}", bundle_id)))
}

async fn export(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    Ok(Json(app.export().await?))
}

async fn import(
    State(state): State<ApiState>,
    Json(snapshot): Json<Snapshot>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    app.import(&snapshot).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let app = state.app.lock().await;
    app.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}
