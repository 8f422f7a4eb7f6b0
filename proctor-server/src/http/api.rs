//! REST API handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use proctor_core::{
    EndReason, MetricsSnapshot, RawSample, RiskSnapshot, SessionError, SessionRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{AppState, ServerError};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Number of live exam sessions
    pub active_sessions: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active_sessions = state.registry.session_count().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions,
    })
}

/// GET /api/metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.registry.metrics())
}

/// Response for listing sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<RiskSnapshot>,
}

/// GET /api/sessions - live sessions only
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.registry.list_snapshots().await,
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<RiskSnapshot>), ServerError> {
    let request = body.map(|Json(body)| body).unwrap_or_default();
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if session_id.trim().is_empty() {
        return Err(ServerError::InvalidMessage("empty session id".to_string()));
    }

    let snapshot = state.registry.start_session(session_id).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/sessions/:id
///
/// Live sessions return their risk snapshot; ended sessions fall back to the
/// stored record.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    match state.registry.snapshot(&id).await {
        Ok(snapshot) => return Ok(Json(snapshot).into_response()),
        Err(SessionError::UnknownSession(_)) => {}
        Err(e) => return Err(e.into()),
    }

    match state.registry.load_record(&id).await? {
        Some(record) => Ok(Json(record).into_response()),
        None if state.registry.is_ended(&id).await => Err(SessionError::AlreadyEnded(id).into()),
        None => Err(SessionError::UnknownSession(id).into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct EndSessionQuery {
    pub reason: Option<String>,
}

/// DELETE /api/sessions/:id?reason=
///
/// Defaults to `force_closed`, the admin action.
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EndSessionQuery>,
) -> Result<Json<SessionRecord>, ServerError> {
    let reason = match query.reason.as_deref() {
        None => EndReason::ForceClosed,
        Some(reason) => EndReason::parse(reason)
            .ok_or_else(|| ServerError::InvalidMessage(format!("unknown end reason: {reason}")))?,
    };

    let record = state.registry.end_session(&id, reason).await?;
    Ok(Json(record))
}

/// Body of POST /api/sessions/:id/samples
#[derive(Debug, Serialize, Deserialize)]
pub struct SampleRequest {
    pub kind: String,
    pub value: Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Camera frame as base64 or a `data:` URL
    #[serde(default)]
    pub frame: Option<String>,
}

/// POST /api/sessions/:id/samples
pub async fn ingest_sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SampleRequest>,
) -> Result<StatusCode, ServerError> {
    let raw = RawSample {
        session_id: id,
        kind: body.kind,
        value: body.value,
        timestamp: body.timestamp,
    };
    state.ingest(raw, body.frame.as_deref()).await?;
    Ok(StatusCode::ACCEPTED)
}
