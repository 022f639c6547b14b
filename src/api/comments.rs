//! Comment thread handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use super::CurrentUser;
use crate::error::Result;
use crate::models::{AddCommentRequest, Comment, CommentThread};
use crate::AppState;

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentThread>>> {
    Ok(Json(state.workflow.list_comments(user, id).await?))
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = state.workflow.add_comment(user, id, req).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
