//! Action log service - assignment, multi-stage closure approval and
//! delegation of approval authority

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod websocket;
pub mod workflow;

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::store::Store;
use crate::workflow::WorkflowManager;

/// Application state shared across handlers
pub struct AppState {
    pub workflow: WorkflowManager,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self {
            workflow: WorkflowManager::new(Store::new(pool)),
        })
    }

    pub fn store(&self) -> &Store {
        self.workflow.store()
    }
}

/// The full HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::handler))
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
