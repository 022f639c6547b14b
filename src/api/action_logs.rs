//! Action log handlers

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::CurrentUser;
use crate::error::{AppError, Result};
use crate::models::{
    ActionLog, ActionLogView, ApproveRequest, AssignRequest, AssignmentRecord,
    CreateActionLogRequest, ListActionLogsQuery, Paginated, RejectRequest, UpdateActionLogRequest,
};
use crate::AppState;

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListActionLogsQuery>,
) -> Result<Json<Paginated<ActionLogView>>> {
    Ok(Json(state.workflow.list_logs(user, query).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateActionLogRequest>,
) -> Result<(StatusCode, Json<ActionLog>)> {
    let log = state.workflow.create_log(user, req).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionLogView>> {
    Ok(Json(state.workflow.get_log(user, id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateActionLogRequest>,
) -> Result<Json<ActionLog>> {
    Ok(Json(state.workflow.update_log(user, id, req).await?))
}

pub async fn assign(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<ActionLog>> {
    Ok(Json(state.workflow.assign(user, id, req).await?))
}

/// The body is optional; when present it must be a valid `ApproveRequest`
pub async fn approve(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ActionLog>> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        ApproveRequest::default()
    } else {
        serde_json::from_slice::<ApproveRequest>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid approve body: {}", e)))?
    };
    Ok(Json(state.workflow.approve(user, id, req.comment).await?))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<ActionLog>> {
    Ok(Json(state.workflow.reject(user, id, req.reason).await?))
}

pub async fn assignment_history(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AssignmentRecord>>> {
    Ok(Json(state.workflow.assignment_history(user, id).await?))
}

pub async fn unread_notifications(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let count = state.workflow.unread_notifications(&user, id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

pub async fn mark_notifications_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let marked = state.workflow.mark_notifications_read(&user, id).await?;
    Ok(Json(json!({ "marked_read": marked })))
}
