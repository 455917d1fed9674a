//! Account lifecycle, session cookies, profiles and the leaderboard.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, tokens};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser};
use crate::routes::envelope;
use crate::state::AppState;
use crate::users::model;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/refresh", get(refresh))
        .route("/leaderboard", get(leaderboard))
        .route("/leaderboard/position", get(my_position))
        .route(
            "/leaderboard/position/username/{username}",
            get(position_by_username),
        )
        .route("/profile/me", get(my_profile))
        .route("/profile/{username}", get(public_profile))
        .route("/me", put(update_me).delete(delete_me))
        .route("/", get(list_users))
        .route("/{id}", get(get_user).delete(delete_user_admin))
}

type SetCookies = AppendHeaders<[(header::HeaderName, String); 2]>;

/// Sign both session tokens and wrap them as Set-Cookie headers.
fn issue_session(
    config: &Config,
    user_id: i64,
    username: &str,
    role: &str,
) -> AppResult<SetCookies> {
    let access = tokens::sign(
        config.access_secret(),
        config.access_token_ttl_secs(),
        user_id,
        username,
        role,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))?;
    let refresh = tokens::sign(
        config.refresh_secret(),
        config.refresh_token_ttl_secs(),
        user_id,
        username,
        role,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign refresh token: {}", e)))?;

    Ok(AppendHeaders([
        (
            header::SET_COOKIE,
            auth::token_cookie(auth::ACCESS_COOKIE, &access, config.access_token_ttl_secs()),
        ),
        (
            header::SET_COOKIE,
            auth::token_cookie(
                auth::REFRESH_COOKIE,
                &refresh,
                config.refresh_token_ttl_secs(),
            ),
        ),
    ]))
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    pub description: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> AppResult<Response> {
    let username = payload.username.trim();
    let email = payload.email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(AppError::Validation("Username and email are required".into()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }

    let hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;

    let user_id = model::create_user(
        &state.db,
        username,
        &hash,
        email,
        payload.description.as_deref(),
    )?;

    tracing::info!(user_id, username, "user registered");

    let cookies = issue_session(&state.config, user_id, username, "user")?;
    Ok((
        StatusCode::CREATED,
        cookies,
        envelope(
            "User registered",
            json!({ "id": user_id, "username": username }),
        ),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<Response> {
    if payload.username.is_none() && payload.email.is_none() {
        return Err(AppError::Validation("Username or email is required".into()));
    }

    let row = model::find_login(
        &state.db,
        payload.username.as_deref(),
        payload.email.as_deref(),
    )?
    .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    let valid = bcrypt::verify(&payload.password, &row.password_hash)
        .map_err(|e| AppError::Internal(format!("Failed to verify password: {}", e)))?;
    if !valid {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    tracing::info!(user_id = row.id, username = %row.username, "user logged in");

    let cookies = issue_session(&state.config, row.id, &row.username, &row.role)?;
    Ok((
        cookies,
        envelope(
            "Login successful",
            json!({ "id": row.id, "username": row.username }),
        ),
    )
        .into_response())
}

async fn logout() -> Response {
    (
        AppendHeaders([
            (header::SET_COOKIE, auth::clear_cookie(auth::ACCESS_COOKIE)),
            (header::SET_COOKIE, auth::clear_cookie(auth::REFRESH_COOKIE)),
        ]),
        envelope("Logged out", ()),
    )
        .into_response()
}

/// Mint a fresh access token from a valid refresh cookie. The user row is
/// re-read so a deleted account cannot refresh its way back in.
async fn refresh(
    State(state): State<AppState>,
    parts: axum::http::request::Parts,
) -> AppResult<Response> {
    let token = auth::get_cookie_value(&parts, auth::REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("Refresh token missing".into()))?;
    let claims = tokens::verify(state.config.refresh_secret(), token)
        .ok_or_else(|| AppError::Unauthorized("Refresh token expired or invalid".into()))?;

    let user = model::get_user(&state.db, claims.sub)?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;

    let access = tokens::sign(
        state.config.access_secret(),
        state.config.access_token_ttl_secs(),
        user.id,
        &user.username,
        &user.role,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            auth::token_cookie(
                auth::ACCESS_COOKIE,
                &access,
                state.config.access_token_ttl_secs(),
            ),
        )]),
        envelope("Access token refreshed", ()),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub count: Option<i64>,
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Response> {
    let count = query.count.unwrap_or(10).clamp(1, 100);
    let entries = model::leaderboard(&state.db, count)?;
    Ok(envelope("Leaderboard retrieved", entries).into_response())
}

async fn my_position(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let position = model::leaderboard_position(&state.db, user.id)?;
    Ok(envelope(
        "Leaderboard position retrieved",
        json!({ "username": user.username, "position": position }),
    )
    .into_response())
}

async fn position_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let position = model::leaderboard_position_by_username(&state.db, &username)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(envelope(
        "Leaderboard position retrieved",
        json!({ "username": username, "position": position }),
    )
    .into_response())
}

async fn my_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let profile = model::self_profile(&state.db, user.id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(envelope("Profile retrieved", profile).into_response())
}

async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let profile = model::profile_by_username(&state.db, &username)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(envelope("Profile retrieved", profile).into_response())
}

#[derive(Deserialize)]
pub struct UpdateMePayload {
    pub username: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub password: Option<String>,
    // Present only so attempts to set them fail loudly instead of silently.
    pub points: Option<i64>,
    pub credits: Option<i64>,
}

async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpdateMePayload>,
) -> AppResult<Response> {
    if payload.points.is_some() || payload.credits.is_some() {
        return Err(AppError::Validation(
            "Points and credits cannot be updated directly".into(),
        ));
    }

    let password_hash = match payload.password.as_deref() {
        Some(password) if password.len() < 8 => {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }
        Some(password) => Some(
            bcrypt::hash(password, bcrypt::DEFAULT_COST)
                .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?,
        ),
        None => None,
    };

    model::update_user(
        &state.db,
        user.id,
        &model::UserUpdate {
            username: payload.username.as_deref(),
            email: payload.email.as_deref(),
            description: payload.description.as_deref(),
            password_hash: password_hash.as_deref(),
        },
    )?;

    let updated = model::get_user(&state.db, user.id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(envelope("Account updated", updated).into_response())
}

async fn delete_me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    model::delete_user(&state.db, user.id)?;
    tracing::info!(user_id = user.id, "account deleted");
    Ok((
        AppendHeaders([
            (header::SET_COOKIE, auth::clear_cookie(auth::ACCESS_COOKIE)),
            (header::SET_COOKIE, auth::clear_cookie(auth::REFRESH_COOKIE)),
        ]),
        envelope("Account deleted", ()),
    )
        .into_response())
}

async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let users = model::list_users(&state.db)?;
    Ok(envelope("Users retrieved", users).into_response())
}

async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let user = model::get_user(&state.db, id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(envelope("User retrieved", user).into_response())
}

async fn delete_user_admin(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let deleted = model::delete_user(&state.db, id)?;
    if deleted == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }
    tracing::info!(user_id = id, "account deleted by admin");
    Ok(envelope("Account deleted", ()).into_response())
}
