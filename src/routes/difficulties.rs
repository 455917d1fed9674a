//! Difficulty reference data, read-only.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::{params, OptionalExtension};

use crate::db::models::Difficulty;
use crate::error::{AppError, AppResult};
use crate::routes::envelope;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{id}", get(get_one))
}

fn difficulty_from_row(row: &rusqlite::Row) -> rusqlite::Result<Difficulty> {
    Ok(Difficulty {
        id: row.get(0)?,
        name: row.get(1)?,
        min_value: row.get(2)?,
    })
}

async fn list(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt =
        conn.prepare("SELECT id, name, min_value FROM difficulties ORDER BY min_value ASC")?;
    let rows = stmt
        .query_map([], difficulty_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(envelope("Difficulties retrieved", rows).into_response())
}

async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let difficulty = conn
        .query_row(
            "SELECT id, name, min_value FROM difficulties WHERE id = ?1",
            params![id],
            difficulty_from_row,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("Difficulty not found".into()))?;
    Ok(envelope("Difficulty retrieved", difficulty).into_response())
}
