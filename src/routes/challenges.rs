//! Challenge CRUD and the start/complete/abandon lifecycle endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::challenges::{model, validation};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::envelope;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/mine", get(mine))
        .route("/{id}", get(get_one).put(update).delete(remove))
        .route("/{id}/completers", get(completers))
        .route("/{id}/start", post(start))
        .route("/{id}/complete", post(complete))
        .route("/{id}/abandon", delete(abandon))
}

#[derive(Deserialize)]
pub struct ChallengePayload {
    pub title: String,
    pub description: Option<String>,
    pub points_rewarded: i64,
    pub credits_rewarded: i64,
    pub duration_days: i64,
    pub difficulty_id: i64,
    pub is_active: Option<bool>,
}

impl ChallengePayload {
    fn validate(&self) -> AppResult<()> {
        validation::validate(&validation::ChallengeInput {
            title: &self.title,
            points_rewarded: self.points_rewarded,
            credits_rewarded: self.credits_rewarded,
            duration_days: self.duration_days,
            difficulty_id: self.difficulty_id,
        })
    }

    fn as_new_challenge(&self) -> model::NewChallenge<'_> {
        model::NewChallenge {
            title: self.title.trim(),
            description: self.description.as_deref(),
            points_rewarded: self.points_rewarded,
            credits_rewarded: self.credits_rewarded,
            duration_days: self.duration_days,
            difficulty_id: self.difficulty_id,
        }
    }
}

async fn list(State(state): State<AppState>) -> AppResult<Response> {
    let challenges = model::list_all(&state.db)?;
    Ok(envelope("Challenges retrieved", challenges).into_response())
}

async fn mine(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let challenges = model::list_by_creator(&state.db, user.id)?;
    Ok(envelope("Challenges retrieved", challenges).into_response())
}

async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Response> {
    let challenge = model::get(&state.db, id)?
        .ok_or_else(|| AppError::NotFound("Challenge not found".into()))?;
    Ok(envelope("Challenge retrieved", challenge).into_response())
}

async fn completers(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Response> {
    let rows = model::completers(&state.db, id)?;
    Ok(envelope("Completers retrieved", rows).into_response())
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<ChallengePayload>,
) -> AppResult<Response> {
    payload.validate()?;
    let id = model::create(&state.db, user.id, &payload.as_new_challenge())?;
    tracing::info!(challenge_id = id, creator_id = user.id, "challenge created");

    let challenge = model::get(&state.db, id)?
        .ok_or_else(|| AppError::Internal("Challenge vanished after insert".into()))?;
    Ok((
        StatusCode::CREATED,
        envelope("Challenge created", challenge),
    )
        .into_response())
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ChallengePayload>,
) -> AppResult<Response> {
    payload.validate()?;
    let updated = model::update(
        &state.db,
        id,
        user.id,
        &payload.as_new_challenge(),
        payload.is_active.unwrap_or(true),
    )?;
    if updated == 0 {
        return Err(AppError::NotFound(
            "Challenge not found or not created by you".into(),
        ));
    }

    let challenge = model::get(&state.db, id)?
        .ok_or_else(|| AppError::Internal("Challenge vanished after update".into()))?;
    Ok(envelope("Challenge updated", challenge).into_response())
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let deleted = model::delete(&state.db, id, user.id)?;
    if deleted == 0 {
        return Err(AppError::NotFound(
            "Challenge not found or not created by you".into(),
        ));
    }
    tracing::info!(challenge_id = id, user_id = user.id, "challenge deleted");
    Ok(envelope("Challenge deleted", ()).into_response())
}

#[derive(Deserialize, Default)]
pub struct AttemptPayload {
    pub notes: Option<String>,
}

async fn start(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    payload: Option<Json<AttemptPayload>>,
) -> AppResult<Response> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    match model::start_challenge(&state.db, user.id, id, payload.notes.as_deref())? {
        model::StartOutcome::Started(completion_id) => Ok((
            StatusCode::CREATED,
            envelope(
                "Challenge started",
                json!({ "completion_id": completion_id, "status": "pending" }),
            ),
        )
            .into_response()),
        model::StartOutcome::AlreadyRecorded(status) => Ok(envelope(
            "Challenge already recorded for this user",
            json!({ "status": status }),
        )
        .into_response()),
    }
}

async fn complete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    payload: Option<Json<AttemptPayload>>,
) -> AppResult<Response> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let notes = payload
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("Completion notes are required".into()))?;

    let (points, credits) = model::complete_challenge(&state.db, user.id, id, Some(notes))?;
    tracing::info!(
        challenge_id = id,
        user_id = user.id,
        points,
        credits,
        "challenge completed"
    );
    Ok((
        StatusCode::CREATED,
        envelope(
            "Challenge completed",
            json!({ "points": points, "credits": credits }),
        ),
    )
        .into_response())
}

async fn abandon(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    model::abandon_challenge(&state.db, user.id, id)?;
    Ok(envelope("Challenge abandoned", ()).into_response())
}
