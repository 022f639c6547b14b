//! Delegation registry handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::CurrentUser;
use crate::error::Result;
use crate::models::{CreateDelegationRequest, UpdateDelegationRequest};
use crate::workflow::DelegationView;
use crate::AppState;

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<DelegationView>>> {
    Ok(Json(state.workflow.list_delegations(&user).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateDelegationRequest>,
) -> Result<(StatusCode, Json<DelegationView>)> {
    let delegation = state.workflow.create_delegation(user, req).await?;
    Ok((StatusCode::CREATED, Json(delegation)))
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DelegationView>> {
    Ok(Json(state.workflow.get_delegation(&user, id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDelegationRequest>,
) -> Result<Json<DelegationView>> {
    Ok(Json(state.workflow.update_delegation(&user, id, req).await?))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DelegationView>> {
    Ok(Json(state.workflow.revoke_delegation(&user, id).await?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.workflow.delete_delegation(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let holder = state.workflow.resolve_authority(user_id).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "current_holder": holder,
        "delegated": holder != user_id,
    })))
}
