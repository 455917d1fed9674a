//! Read-side views over challenge attempts.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::params;
use serde::Serialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::envelope;
use crate::state::{AppState, DbPool};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/missions", get(missions))
        .route("/pending", get(pending))
        .route("/users/{challenge_id}", get(users_for_challenge))
}

/// An attempt joined with its challenge, as shown on mission logs.
#[derive(Debug, Serialize)]
struct MissionRow {
    completion_id: i64,
    challenge_id: i64,
    title: String,
    points_rewarded: i64,
    credits_rewarded: i64,
    status: String,
    notes: Option<String>,
    started_at: String,
    updated_at: String,
}

fn missions_for_user(
    pool: &DbPool,
    user_id: i64,
    status: Option<&str>,
) -> AppResult<Vec<MissionRow>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT uc.id, c.id, c.title, c.points_rewarded, c.credits_rewarded,
                uc.status, uc.notes, uc.created_at, uc.updated_at
         FROM user_completions uc
         JOIN challenges c ON uc.challenge_id = c.id
         WHERE uc.user_id = ?1 AND (?2 IS NULL OR uc.status = ?2)
         ORDER BY uc.updated_at DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id, status], |row| {
            Ok(MissionRow {
                completion_id: row.get(0)?,
                challenge_id: row.get(1)?,
                title: row.get(2)?,
                points_rewarded: row.get(3)?,
                credits_rewarded: row.get(4)?,
                status: row.get(5)?,
                notes: row.get(6)?,
                started_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

async fn missions(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let rows = missions_for_user(&state.db, user.id, None)?;
    Ok(envelope("Missions retrieved", rows).into_response())
}

async fn pending(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let rows = missions_for_user(&state.db, user.id, Some("pending"))?;
    Ok(envelope("Pending missions retrieved", rows).into_response())
}

#[derive(Debug, Serialize)]
struct AttemptUserRow {
    user_id: i64,
    username: String,
    status: String,
    notes: Option<String>,
    updated_at: String,
}

async fn users_for_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, uc.status, uc.notes, uc.updated_at
         FROM user_completions uc
         JOIN users u ON uc.user_id = u.id
         WHERE uc.challenge_id = ?1
         ORDER BY uc.updated_at DESC",
    )?;
    let rows = stmt
        .query_map(params![challenge_id], |row| {
            Ok(AttemptUserRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                status: row.get(2)?,
                notes: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(envelope("Challenge attempts retrieved", rows).into_response())
}
