use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rusqlite::params;

use crate::auth::{self, tokens};
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
///
/// The access token carries id/username/role, but the user row is re-read so
/// that deleted accounts are rejected even while their token is still valid.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = auth::get_cookie_value(parts, auth::ACCESS_COOKIE)
            .ok_or_else(|| AppError::Unauthorized("Access token missing".into()))?;

        let claims = tokens::verify(state.config.access_secret(), token)
            .ok_or_else(|| AppError::Unauthorized("Access token expired or invalid".into()))?;

        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, username, role FROM users WHERE id = ?1",
            params![claims.sub],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: row.get(2)?,
                })
            },
        )
        .map_err(|_| AppError::Unauthorized("User no longer exists".into()))
    }
}

/// Extractor that additionally requires the admin role.
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin role required".into()));
        }
        Ok(AdminUser(user))
    }
}
