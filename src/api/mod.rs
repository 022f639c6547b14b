//! REST API

mod action_logs;
mod comments;
mod delegations;
mod extract;
mod users;

pub use extract::{active_user, CurrentUser};

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Delegations are served under both prefixes
const DELEGATION_PREFIXES: [&str; 2] = ["/users/delegations", "/delegations"];

pub fn routes() -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route(
            "/action-logs/",
            get(action_logs::list).post(action_logs::create),
        )
        .route(
            "/action-logs/:id/",
            get(action_logs::fetch).patch(action_logs::update),
        )
        .route("/action-logs/:id/assign/", post(action_logs::assign))
        .route("/action-logs/:id/approve/", post(action_logs::approve))
        .route("/action-logs/:id/reject/", post(action_logs::reject))
        .route(
            "/action-logs/:id/comments/",
            get(comments::list).post(comments::add),
        )
        .route(
            "/action-logs/:id/assignment_history/",
            get(action_logs::assignment_history),
        )
        .route(
            "/action-logs/:id/unread_notifications/",
            get(action_logs::unread_notifications),
        )
        .route(
            "/action-logs/:id/mark_notifications_read/",
            post(action_logs::mark_notifications_read),
        )
        .route("/users/", get(users::list).post(users::create))
        .route("/users/me/", get(users::me))
        .route(
            "/users/:id/",
            get(users::fetch)
                .patch(users::update)
                .delete(users::deactivate),
        )
        .route("/users/department_users/", get(users::department_users))
        .route(
            "/users/department_unit_users/",
            get(users::department_unit_users),
        )
        .route(
            "/departments/",
            get(users::list_departments).post(users::create_department),
        )
        .route(
            "/departments/units/",
            get(users::list_units).post(users::create_unit),
        )
        .route("/departments/:id/", get(users::fetch_department))
        .route("/departments/:id/units/", get(users::department_units));

    for prefix in DELEGATION_PREFIXES {
        router = router
            .route(
                &format!("{}/", prefix),
                get(delegations::list).post(delegations::create),
            )
            .route(
                &format!("{}/:id/", prefix),
                get(delegations::fetch)
                    .put(delegations::update)
                    .delete(delegations::delete),
            )
            .route(
                &format!("{}/:id/revoke/", prefix),
                post(delegations::revoke),
            )
            .route(
                &format!("{}/resolve/:user_id/", prefix),
                get(delegations::resolve),
            );
    }

    router
}
