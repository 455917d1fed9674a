//! User accounts, rank-inclusive profiles and the leaderboard.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::db::models::User;
use crate::error::AppError;
use crate::state::DbPool;

const USER_COLUMNS: &str =
    "id, username, email, description, points, credits, role, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        description: row.get(3)?,
        points: row.get(4)?,
        credits: row.get(5)?,
        role: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Credentials row for login; the only query allowed to read the hash.
pub struct LoginRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

/// Rank-inclusive profile. `next_rank_*` fields are None at the top rank.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub username: String,
    pub points: i64,
    pub credits: i64,
    pub account_age: String,
    pub missions_completed: i64,
    pub missions_pending: i64,
    pub missions_total: i64,
    pub rank_id: i64,
    pub rank: String,
    pub min_points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_rank_min_points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_rank_points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_rank_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub username: String,
    pub points: i64,
    pub credits: i64,
    pub rank: String,
}

/// Insert a new user. The username collides on the unique index rather than
/// an application pre-check.
pub fn create_user(
    pool: &DbPool,
    username: &str,
    password_hash: &str,
    email: &str,
    description: Option<&str>,
) -> Result<i64, AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO users (username, password_hash, email, description)
         VALUES (?1, ?2, ?3, ?4)",
        params![username, password_hash, email, description],
    )
    .map_err(|e| {
        if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            AppError::Conflict("Username already taken".into())
        } else {
            AppError::Database(e)
        }
    })?;
    Ok(conn.last_insert_rowid())
}

/// Look up login credentials by username or email.
pub fn find_login(
    pool: &DbPool,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<Option<LoginRow>, AppError> {
    let conn = pool.get()?;
    let row = conn
        .query_row(
            "SELECT id, username, password_hash, role FROM users
             WHERE email = ?1 OR username = ?2",
            params![email, username],
            |row| {
                Ok(LoginRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    role: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn get_user(pool: &DbPool, id: i64) -> Result<Option<User>, AppError> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(pool: &DbPool) -> Result<Vec<User>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
    ))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Partial account update; only provided fields are written. Points and
/// credits are deliberately not updatable through this path.
pub struct UserUpdate<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub description: Option<&'a str>,
    pub password_hash: Option<&'a str>,
}

pub fn update_user(pool: &DbPool, id: i64, update: &UserUpdate) -> Result<usize, AppError> {
    let mut assignments: Vec<&str> = Vec::new();
    let mut values: Vec<&dyn rusqlite::ToSql> = Vec::new();

    if let Some(ref username) = update.username {
        assignments.push("username = ?");
        values.push(username);
    }
    if let Some(ref email) = update.email {
        assignments.push("email = ?");
        values.push(email);
    }
    if let Some(ref description) = update.description {
        assignments.push("description = ?");
        values.push(description);
    }
    if let Some(ref password_hash) = update.password_hash {
        assignments.push("password_hash = ?");
        values.push(password_hash);
    }

    if assignments.is_empty() {
        return Err(AppError::Validation("No data fields to update".into()));
    }

    let sql = format!(
        "UPDATE users SET {}, updated_at = datetime('now') WHERE id = ?",
        assignments.join(", ")
    );
    values.push(&id);

    let conn = pool.get()?;
    let updated = conn.execute(&sql, &values[..]).map_err(|e| {
        if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            AppError::Conflict("Username already taken".into())
        } else {
            AppError::Database(e)
        }
    })?;
    Ok(updated)
}

pub fn delete_user(pool: &DbPool, id: i64) -> Result<usize, AppError> {
    let conn = pool.get()?;
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(deleted)
}

fn user_id_by_username(pool: &DbPool, username: &str) -> Result<Option<i64>, AppError> {
    let conn = pool.get()?;
    let id = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn profile_by_username(pool: &DbPool, username: &str) -> Result<Option<Profile>, AppError> {
    match user_id_by_username(pool, username)? {
        Some(id) => profile_by_id(pool, id, false),
        None => Ok(None),
    }
}

pub fn self_profile(pool: &DbPool, user_id: i64) -> Result<Option<Profile>, AppError> {
    profile_by_id(pool, user_id, true)
}

fn profile_by_id(
    pool: &DbPool,
    user_id: i64,
    with_progress: bool,
) -> Result<Option<Profile>, AppError> {
    let conn = pool.get()?;

    let profile = conn
        .query_row(
            "SELECT u.username, u.points, u.credits, u.created_at,
                (SELECT COUNT(*) FROM user_completions uc
                   WHERE uc.user_id = u.id AND uc.status = 'completed'),
                (SELECT COUNT(*) FROM user_completions uc
                   WHERE uc.user_id = u.id AND uc.status = 'pending'),
                (SELECT COUNT(*) FROM user_completions uc WHERE uc.user_id = u.id),
                r.id, r.name, r.min_points
             FROM users u
             JOIN ranks r ON u.points >= r.min_points
             WHERE u.id = ?1
             ORDER BY r.min_points DESC
             LIMIT 1",
            params![user_id],
            |row| {
                Ok(Profile {
                    username: row.get(0)?,
                    points: row.get(1)?,
                    credits: row.get(2)?,
                    account_age: row.get(3)?,
                    missions_completed: row.get(4)?,
                    missions_pending: row.get(5)?,
                    missions_total: row.get(6)?,
                    rank_id: row.get(7)?,
                    rank: row.get(8)?,
                    min_points: row.get(9)?,
                    next_rank_min_points: None,
                    next_rank_points: None,
                    next_rank_percentage: None,
                })
            },
        )
        .optional()?;

    let Some(mut profile) = profile else {
        return Ok(None);
    };

    if with_progress {
        let next_min: Option<i64> = conn
            .query_row(
                "SELECT min_points FROM ranks WHERE min_points > ?1
                 ORDER BY min_points ASC LIMIT 1",
                params![profile.min_points],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(next_min) = next_min {
            let span = next_min - profile.min_points;
            let earned = profile.points - profile.min_points;
            let percentage = if span <= 0 {
                100.0
            } else {
                (earned as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
            };
            profile.next_rank_min_points = Some(next_min);
            profile.next_rank_points = Some(next_min - profile.points);
            profile.next_rank_percentage = Some(percentage);
        }
    }

    Ok(Some(profile))
}

/// Top `count` users by points, credits breaking ties.
pub fn leaderboard(pool: &DbPool, count: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.points, u.credits,
            (SELECT r.name FROM ranks r WHERE u.points >= r.min_points
             ORDER BY r.min_points DESC LIMIT 1)
         FROM users u
         ORDER BY u.points DESC, u.credits DESC
         LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![count], |row| {
            Ok(LeaderboardEntry {
                id: row.get(0)?,
                username: row.get(1)?,
                points: row.get(2)?,
                credits: row.get(3)?,
                rank: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// 1-based leaderboard position: users strictly ahead on points, or tied on
/// points and ahead on credits, plus one.
pub fn leaderboard_position(pool: &DbPool, user_id: i64) -> Result<i64, AppError> {
    let conn = pool.get()?;
    let position = conn.query_row(
        "SELECT COUNT(*) + 1 FROM users u
         WHERE u.points > (SELECT points FROM users WHERE id = ?1)
            OR (u.points = (SELECT points FROM users WHERE id = ?1)
                AND u.credits > (SELECT credits FROM users WHERE id = ?1))",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(position)
}

pub fn leaderboard_position_by_username(
    pool: &DbPool,
    username: &str,
) -> Result<Option<i64>, AppError> {
    match user_id_by_username(pool, username)? {
        Some(id) => Ok(Some(leaderboard_position(pool, id)?)),
        None => Ok(None),
    }
}
