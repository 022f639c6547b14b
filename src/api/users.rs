//! User, department and unit handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::CurrentUser;
use crate::error::{AppError, Result};
use crate::models::{
    CreateDepartmentRequest, CreateUnitRequest, CreateUserRequest, Department,
    DepartmentUnitQuery, DepartmentWithUnits, Unit, UpdateUserRequest, User, UserProfile,
};
use crate::store::Store;
use crate::AppState;

fn require_admin(user: &User) -> Result<()> {
    if !user.role.is_admin() {
        return Err(AppError::Forbidden(
            "Only super admins can perform this action".to_string(),
        ));
    }
    Ok(())
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.store().list_users().await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    require_admin(&user)?;
    let store = state.store();

    let username = required(&req.username, "username")?;
    if store
        .list_users()
        .await?
        .iter()
        .any(|u| u.username == username)
    {
        return Err(AppError::Conflict(format!(
            "Username {} is already taken",
            username
        )));
    }
    check_placement(store, req.department_id, req.unit_id).await?;

    let now = Utc::now();
    let created = User {
        id: Uuid::new_v4(),
        username,
        email: req.email,
        first_name: req.first_name,
        last_name: req.last_name,
        role: req.role,
        designation: req.designation,
        authorities: req.authorities,
        department_id: req.department_id,
        unit_id: req.unit_id,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&created).await?;
    tracing::info!(user_id = %created.id, actor = %user.id, "User created");

    Ok((StatusCode::CREATED, Json(created)))
}

/// The department must exist and contain the unit
async fn check_placement(
    store: &Store,
    department_id: Option<Uuid>,
    unit_id: Option<Uuid>,
) -> Result<()> {
    if let Some(department_id) = department_id {
        store.get_department(department_id).await?;
    }
    if let Some(unit_id) = unit_id {
        let unit = store.get_unit(unit_id).await?;
        if department_id.is_some_and(|d| d != unit.department_id) {
            return Err(AppError::BadRequest(format!(
                "Unit {} does not belong to the given department",
                unit_id
            )));
        }
    }
    Ok(())
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    Ok(Json(state.store().get_user(id).await?))
}

/// Users may edit their own contact details; everything else is admin-only
pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    if id != user.id || req.changes_privileges() {
        require_admin(&user)?;
    }
    if id == user.id && req.is_active == Some(false) {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    let store = state.store();
    let mut target = store.get_user(id).await?;

    if let Some(email) = req.email {
        target.email = email.trim().to_string();
    }
    if let Some(first_name) = req.first_name {
        target.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = req.last_name {
        target.last_name = last_name.trim().to_string();
    }
    if let Some(role) = req.role {
        target.role = role;
    }
    if let Some(designation) = req.designation {
        target.designation = designation;
    }
    if let Some(authorities) = req.authorities {
        target.authorities = authorities;
    }
    if let Some(department_id) = req.department_id {
        target.department_id = department_id;
    }
    if let Some(unit_id) = req.unit_id {
        target.unit_id = unit_id;
    }
    if let Some(is_active) = req.is_active {
        target.is_active = is_active;
    }
    check_placement(store, target.department_id, target.unit_id).await?;

    target.updated_at = Utc::now();
    store.update_user(&target).await?;
    tracing::info!(
        user_id = %target.id,
        actor = %user.id,
        is_active = target.is_active,
        "User updated"
    );

    Ok(Json(target))
}

/// Users are deactivated rather than removed; their history stays attributable
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    require_admin(&user)?;
    if id == user.id {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    let store = state.store();
    let mut target = store.get_user(id).await?;
    if target.is_active {
        target.is_active = false;
        target.updated_at = Utc::now();
        store.update_user(&target).await?;
        tracing::info!(user_id = %id, actor = %user.id, "User deactivated");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.workflow.profile(user).await?))
}

/// Users sharing the caller's department
pub async fn department_users(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<User>>> {
    let users = match user.department_id {
        Some(department_id) => state.store().list_department_users(department_id).await?,
        None => Vec::new(),
    };
    Ok(Json(users))
}

pub async fn department_unit_users(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<DepartmentUnitQuery>,
) -> Result<Json<Vec<User>>> {
    let store = state.store();
    let unit = store.get_unit(query.department_unit).await?;
    Ok(Json(store.list_unit_users(unit.id).await?))
}

pub async fn list_departments(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<DepartmentWithUnits>>> {
    let store = state.store();
    let mut units = store.list_units().await?;

    let departments = store
        .list_departments()
        .await?
        .into_iter()
        .map(|department| {
            let (own, rest): (Vec<Unit>, Vec<Unit>) = units
                .drain(..)
                .partition(|u| u.department_id == department.id);
            units = rest;
            DepartmentWithUnits {
                department,
                units: own,
            }
        })
        .collect();

    Ok(Json(departments))
}

pub async fn create_department(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<Department>)> {
    require_admin(&user)?;

    let now = Utc::now();
    let department = Department {
        id: Uuid::new_v4(),
        name: required(&req.name, "name")?,
        code: required(&req.code, "code")?,
        description: req.description,
        created_at: now,
        updated_at: now,
    };
    state.store().create_department(&department).await?;

    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn fetch_department(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DepartmentWithUnits>> {
    let store = state.store();
    let department = store.get_department(id).await?;
    let units = store.list_department_units(id).await?;
    Ok(Json(DepartmentWithUnits { department, units }))
}

pub async fn department_units(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Unit>>> {
    let store = state.store();
    store.get_department(id).await?;
    Ok(Json(store.list_department_units(id).await?))
}

pub async fn list_units(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<Unit>>> {
    Ok(Json(state.store().list_units().await?))
}

pub async fn create_unit(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateUnitRequest>,
) -> Result<(StatusCode, Json<Unit>)> {
    require_admin(&user)?;
    let store = state.store();
    let department = store.get_department(req.department_id).await?;

    let now = Utc::now();
    let unit = Unit {
        id: Uuid::new_v4(),
        department_id: department.id,
        name: required(&req.name, "name")?,
        unit_type: req.unit_type,
        description: req.description,
        created_at: now,
        updated_at: now,
    };
    store.create_unit(&unit).await?;

    Ok((StatusCode::CREATED, Json(unit)))
}
