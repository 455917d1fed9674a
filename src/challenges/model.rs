//! Challenge CRUD plus the start/complete/abandon lifecycle.
//!
//! Completion is the invariant-bearing operation: the pending→completed flip
//! and the reward transfer happen in one transaction, and the flip is a
//! conditional UPDATE so a challenge can only ever pay out once.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::db::models::Challenge;
use crate::error::AppError;
use crate::state::DbPool;

#[derive(Debug, Error, PartialEq)]
pub enum ChallengeError {
    #[error("Challenge not found")]
    NotFound,

    #[error("Challenge is not active")]
    Inactive,

    #[error("Challenge already completed or not started")]
    NotPending,

    #[error("No pending attempt for this challenge")]
    NoPendingAttempt,

    #[error("Database error: {0}")]
    Sql(String),
}

impl From<rusqlite::Error> for ChallengeError {
    fn from(e: rusqlite::Error) -> Self {
        ChallengeError::Sql(e.to_string())
    }
}

impl From<r2d2::Error> for ChallengeError {
    fn from(e: r2d2::Error) -> Self {
        ChallengeError::Sql(e.to_string())
    }
}

impl From<ChallengeError> for AppError {
    fn from(e: ChallengeError) -> Self {
        match e {
            ChallengeError::NotFound | ChallengeError::NoPendingAttempt => {
                AppError::NotFound(e.to_string())
            }
            ChallengeError::Inactive => AppError::Validation(e.to_string()),
            ChallengeError::NotPending => AppError::Conflict(e.to_string()),
            ChallengeError::Sql(msg) => AppError::Internal(msg),
        }
    }
}

pub struct NewChallenge<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub points_rewarded: i64,
    pub credits_rewarded: i64,
    pub duration_days: i64,
    pub difficulty_id: i64,
}

/// Challenge row joined with difficulty and creator names for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeWithMeta {
    #[serde(flatten)]
    pub challenge: Challenge,
    pub difficulty_name: Option<String>,
    pub creator_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleterRow {
    pub user_id: i64,
    pub username: String,
    pub completion_details: Option<String>,
    pub completed_at: String,
}

#[derive(Debug, PartialEq)]
pub enum StartOutcome {
    Started(i64),
    /// An attempt already exists; carries its current status.
    AlreadyRecorded(String),
}

fn challenge_from_row(row: &rusqlite::Row) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        points_rewarded: row.get(3)?,
        credits_rewarded: row.get(4)?,
        duration_days: row.get(5)?,
        creator_id: row.get(6)?,
        difficulty_id: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const CHALLENGE_COLUMNS: &str = "c.id, c.title, c.description, c.points_rewarded, \
     c.credits_rewarded, c.duration_days, c.creator_id, c.difficulty_id, c.is_active, \
     c.created_at, c.updated_at";

pub fn list_all(pool: &DbPool) -> Result<Vec<ChallengeWithMeta>, ChallengeError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHALLENGE_COLUMNS}, d.name, u.username
         FROM challenges c
         LEFT JOIN difficulties d ON c.difficulty_id = d.id
         LEFT JOIN users u ON c.creator_id = u.id
         ORDER BY c.created_at DESC"
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ChallengeWithMeta {
                challenge: challenge_from_row(row)?,
                difficulty_name: row.get(11)?,
                creator_name: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(pool: &DbPool, id: i64) -> Result<Option<Challenge>, ChallengeError> {
    let conn = pool.get()?;
    let challenge = conn
        .query_row(
            &format!("SELECT {CHALLENGE_COLUMNS} FROM challenges c WHERE c.id = ?1"),
            params![id],
            challenge_from_row,
        )
        .optional()?;
    Ok(challenge)
}

pub fn list_by_creator(pool: &DbPool, creator_id: i64) -> Result<Vec<Challenge>, ChallengeError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM challenges c WHERE c.creator_id = ?1
         ORDER BY c.created_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![creator_id], challenge_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a new challenge. Validation happens in the handler beforehand.
pub fn create(pool: &DbPool, creator_id: i64, data: &NewChallenge) -> Result<i64, ChallengeError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO challenges
            (title, description, points_rewarded, credits_rewarded, duration_days,
             creator_id, difficulty_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            data.title,
            data.description,
            data.points_rewarded,
            data.credits_rewarded,
            data.duration_days,
            creator_id,
            data.difficulty_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update a challenge. Ownership is enforced by the predicate; a foreign
/// challenge id simply affects zero rows.
pub fn update(
    pool: &DbPool,
    id: i64,
    creator_id: i64,
    data: &NewChallenge,
    is_active: bool,
) -> Result<usize, ChallengeError> {
    let conn = pool.get()?;
    let updated = conn.execute(
        "UPDATE challenges
         SET title = ?1, description = ?2, points_rewarded = ?3, credits_rewarded = ?4,
             duration_days = ?5, difficulty_id = ?6, is_active = ?7,
             updated_at = datetime('now')
         WHERE id = ?8 AND creator_id = ?9",
        params![
            data.title,
            data.description,
            data.points_rewarded,
            data.credits_rewarded,
            data.duration_days,
            data.difficulty_id,
            is_active,
            id,
            creator_id,
        ],
    )?;
    Ok(updated)
}

pub fn delete(pool: &DbPool, id: i64, creator_id: i64) -> Result<usize, ChallengeError> {
    let conn = pool.get()?;
    let deleted = conn.execute(
        "DELETE FROM challenges WHERE id = ?1 AND creator_id = ?2",
        params![id, creator_id],
    )?;
    Ok(deleted)
}

fn require_active(conn: &rusqlite::Connection, challenge_id: i64) -> Result<(), ChallengeError> {
    let is_active: Option<bool> = conn
        .query_row(
            "SELECT is_active FROM challenges WHERE id = ?1",
            params![challenge_id],
            |row| row.get(0),
        )
        .optional()?;
    match is_active {
        None => Err(ChallengeError::NotFound),
        Some(false) => Err(ChallengeError::Inactive),
        Some(true) => Ok(()),
    }
}

/// Start a challenge by recording a pending attempt.
///
/// Starting twice is not an error: the existing attempt's status is reported
/// and no second row is created.
pub fn start_challenge(
    pool: &DbPool,
    user_id: i64,
    challenge_id: i64,
    notes: Option<&str>,
) -> Result<StartOutcome, ChallengeError> {
    let conn = pool.get()?;

    conn.execute("BEGIN IMMEDIATE", [])?;

    let result: Result<StartOutcome, ChallengeError> = (|| {
        require_active(&conn, challenge_id)?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT status FROM user_completions
                 WHERE user_id = ?1 AND challenge_id = ?2",
                params![user_id, challenge_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(status) = existing {
            return Ok(StartOutcome::AlreadyRecorded(status));
        }

        conn.execute(
            "INSERT INTO user_completions (user_id, challenge_id, status, notes)
             VALUES (?1, ?2, 'pending', ?3)",
            params![user_id, challenge_id, notes],
        )?;

        Ok(StartOutcome::Started(conn.last_insert_rowid()))
    })();

    match result {
        Ok(outcome) => {
            conn.execute("COMMIT", [])?;
            Ok(outcome)
        }
        Err(e) => {
            conn.execute("ROLLBACK", [])?;
            Err(e)
        }
    }
}

/// Complete a pending attempt and pay out the reward.
///
/// Returns the user's new (points, credits) totals. The status flip only
/// matches pending rows, so a second completion affects zero rows and fails
/// without touching the totals.
pub fn complete_challenge(
    pool: &DbPool,
    user_id: i64,
    challenge_id: i64,
    notes: Option<&str>,
) -> Result<(i64, i64), ChallengeError> {
    let conn = pool.get()?;

    conn.execute("BEGIN IMMEDIATE", [])?;

    let result: Result<(i64, i64), ChallengeError> = (|| {
        require_active(&conn, challenge_id)?;

        let updated = conn.execute(
            "UPDATE user_completions
             SET status = 'completed', notes = IFNULL(?1, notes),
                 updated_at = datetime('now')
             WHERE user_id = ?2 AND challenge_id = ?3 AND status = 'pending'",
            params![notes, user_id, challenge_id],
        )?;
        if updated == 0 {
            return Err(ChallengeError::NotPending);
        }

        conn.execute(
            "UPDATE users
             SET points = points + (SELECT points_rewarded FROM challenges WHERE id = ?1),
                 credits = credits + (SELECT credits_rewarded FROM challenges WHERE id = ?1),
                 updated_at = datetime('now')
             WHERE id = ?2",
            params![challenge_id, user_id],
        )?;

        let totals = conn.query_row(
            "SELECT points, credits FROM users WHERE id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(totals)
    })();

    match result {
        Ok(totals) => {
            conn.execute("COMMIT", [])?;
            Ok(totals)
        }
        Err(e) => {
            conn.execute("ROLLBACK", [])?;
            Err(e)
        }
    }
}

/// Drop a pending attempt. Completed attempts stay on the record.
pub fn abandon_challenge(
    pool: &DbPool,
    user_id: i64,
    challenge_id: i64,
) -> Result<(), ChallengeError> {
    let conn = pool.get()?;
    let deleted = conn.execute(
        "DELETE FROM user_completions
         WHERE user_id = ?1 AND challenge_id = ?2 AND status = 'pending'",
        params![user_id, challenge_id],
    )?;
    if deleted == 0 {
        return Err(ChallengeError::NoPendingAttempt);
    }
    Ok(())
}

pub fn completers(pool: &DbPool, challenge_id: i64) -> Result<Vec<CompleterRow>, ChallengeError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, uc.notes, uc.updated_at
         FROM user_completions uc
         JOIN users u ON uc.user_id = u.id
         WHERE uc.challenge_id = ?1 AND uc.status = 'completed'",
    )?;
    let rows = stmt
        .query_map(params![challenge_id], |row| {
            Ok(CompleterRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                completion_details: row.get(2)?,
                completed_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_challenge, seed_user, test_pool};

    fn totals_of(pool: &DbPool, user_id: i64) -> (i64, i64) {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT points, credits FROM users WHERE id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn start_creates_single_pending_row() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let user = seed_user(&pool, "player", 0, 0);
        let challenge = seed_challenge(&pool, "first", 40, 20, creator);

        let outcome = start_challenge(&pool, user, challenge, Some("here we go")).unwrap();
        assert!(matches!(outcome, StartOutcome::Started(_)));

        // Second start reports the pending status instead of erroring
        let outcome = start_challenge(&pool, user, challenge, None).unwrap();
        assert_eq!(outcome, StartOutcome::AlreadyRecorded("pending".into()));

        let conn = pool.get().unwrap();
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM user_completions WHERE user_id = ?1",
                params![user],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn start_unknown_challenge_fails() {
        let pool = test_pool();
        let user = seed_user(&pool, "player", 0, 0);
        let err = start_challenge(&pool, user, 999, None).unwrap_err();
        assert_eq!(err, ChallengeError::NotFound);
    }

    #[test]
    fn start_inactive_challenge_fails() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let user = seed_user(&pool, "player", 0, 0);
        let challenge = seed_challenge(&pool, "retired", 10, 5, creator);
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE challenges SET is_active = 0 WHERE id = ?1",
            params![challenge],
        )
        .unwrap();
        drop(conn);

        let err = start_challenge(&pool, user, challenge, None).unwrap_err();
        assert_eq!(err, ChallengeError::Inactive);
    }

    #[test]
    fn complete_pays_out_exactly_once() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let user = seed_user(&pool, "player", 100, 50);
        let challenge = seed_challenge(&pool, "mission", 40, 20, creator);

        start_challenge(&pool, user, challenge, None).unwrap();
        let (points, credits) = complete_challenge(&pool, user, challenge, Some("done")).unwrap();
        assert_eq!((points, credits), (140, 70));
        assert_eq!(totals_of(&pool, user), (140, 70));

        // Completing again affects zero rows and pays nothing
        let err = complete_challenge(&pool, user, challenge, None).unwrap_err();
        assert_eq!(err, ChallengeError::NotPending);
        assert_eq!(totals_of(&pool, user), (140, 70));
    }

    #[test]
    fn complete_without_start_fails() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let user = seed_user(&pool, "player", 0, 0);
        let challenge = seed_challenge(&pool, "mission", 40, 20, creator);

        let err = complete_challenge(&pool, user, challenge, None).unwrap_err();
        assert_eq!(err, ChallengeError::NotPending);
        assert_eq!(totals_of(&pool, user), (0, 0));
    }

    #[test]
    fn complete_keeps_start_notes_when_none_given() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let user = seed_user(&pool, "player", 0, 0);
        let challenge = seed_challenge(&pool, "mission", 10, 5, creator);

        start_challenge(&pool, user, challenge, Some("original notes")).unwrap();
        complete_challenge(&pool, user, challenge, None).unwrap();

        let conn = pool.get().unwrap();
        let notes: Option<String> = conn
            .query_row(
                "SELECT notes FROM user_completions WHERE user_id = ?1 AND challenge_id = ?2",
                params![user, challenge],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(notes.as_deref(), Some("original notes"));
    }

    #[test]
    fn abandon_removes_pending_attempt_only() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let user = seed_user(&pool, "player", 0, 0);
        let challenge = seed_challenge(&pool, "mission", 10, 5, creator);

        start_challenge(&pool, user, challenge, None).unwrap();
        abandon_challenge(&pool, user, challenge).unwrap();
        let err = abandon_challenge(&pool, user, challenge).unwrap_err();
        assert_eq!(err, ChallengeError::NoPendingAttempt);

        // Completed attempts cannot be abandoned
        start_challenge(&pool, user, challenge, None).unwrap();
        complete_challenge(&pool, user, challenge, None).unwrap();
        let err = abandon_challenge(&pool, user, challenge).unwrap_err();
        assert_eq!(err, ChallengeError::NoPendingAttempt);
    }

    #[test]
    fn update_and_delete_enforce_ownership() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let intruder = seed_user(&pool, "intruder", 0, 0);
        let challenge = seed_challenge(&pool, "mine", 10, 5, creator);

        let data = NewChallenge {
            title: "hijacked",
            description: None,
            points_rewarded: 10,
            credits_rewarded: 5,
            duration_days: 1,
            difficulty_id: 1,
        };
        assert_eq!(update(&pool, challenge, intruder, &data, true).unwrap(), 0);
        assert_eq!(delete(&pool, challenge, intruder).unwrap(), 0);

        assert_eq!(update(&pool, challenge, creator, &data, true).unwrap(), 1);
        assert_eq!(delete(&pool, challenge, creator).unwrap(), 1);
    }

    #[test]
    fn listings_carry_difficulty_and_creator_names() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        seed_challenge(&pool, "mission", 10, 5, creator);

        let all = list_all(&pool).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].difficulty_name.as_deref(), Some("Easy"));
        assert_eq!(all[0].creator_name.as_deref(), Some("creator"));

        assert_eq!(list_by_creator(&pool, creator).unwrap().len(), 1);
    }

    #[test]
    fn completers_lists_only_completed() {
        let pool = test_pool();
        let creator = seed_user(&pool, "creator", 0, 0);
        let done = seed_user(&pool, "done", 0, 0);
        let pending = seed_user(&pool, "pending", 0, 0);
        let challenge = seed_challenge(&pool, "mission", 10, 5, creator);

        start_challenge(&pool, done, challenge, None).unwrap();
        complete_challenge(&pool, done, challenge, Some("finished")).unwrap();
        start_challenge(&pool, pending, challenge, None).unwrap();

        let rows = completers(&pool, challenge).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "done");
        assert_eq!(rows[0].completion_details.as_deref(), Some("finished"));
    }
}
