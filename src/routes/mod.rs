pub mod challenges;
pub mod completions;
pub mod difficulties;
pub mod resources;
pub mod users;

use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Success envelope shared by every endpoint.
pub(crate) fn envelope(message: &str, results: impl Serialize) -> Json<Value> {
    Json(json!({ "message": message, "results": results }))
}

/// The full REST surface, mounted under /api.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/users", users::router())
        .nest("/api/challenges", challenges::router())
        .nest("/api/completions", completions::router())
        .nest("/api/resources", resources::router())
        .nest("/api/difficulties", difficulties::router())
}
