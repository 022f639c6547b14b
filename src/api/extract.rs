//! Identification of the acting user

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::AppState;

const USER_ID_HEADER: &str = "x-user-id";

/// The active user named by the `X-User-Id` header
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))?;
        let id = header
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::Unauthorized("Malformed X-User-Id header".to_string()))?;

        active_user(&state, id).await.map(CurrentUser)
    }
}

/// Look up an active user, or reject as unidentified
pub async fn active_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    match state.store().find_user(id).await? {
        Some(user) if user.is_active => Ok(user),
        Some(_) => Err(AppError::Unauthorized(format!("User {} is inactive", id))),
        None => Err(AppError::Unauthorized(format!("Unknown user {}", id))),
    }
}
