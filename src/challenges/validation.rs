//! Stateless checks applied before challenge writes. Violations come back as
//! descriptive errors, never silent clamping.

use crate::error::AppError;

/// points_rewarded must stay below this cap.
pub const POINTS_CAP: i64 = 90;
/// credits_rewarded must stay below this cap.
pub const CREDITS_CAP: i64 = 60;
pub const MAX_DURATION_DAYS: i64 = 365;

/// Total-reward band implied by a difficulty id: (name, min, max inclusive).
/// Hard is open-ended; the per-field caps bound it anyway.
const DIFFICULTY_BANDS: &[(i64, &str, i64, Option<i64>)] = &[
    (1, "Easy", 0, Some(50)),
    (2, "Medium", 51, Some(100)),
    (3, "Hard", 101, None),
];

pub struct ChallengeInput<'a> {
    pub title: &'a str,
    pub points_rewarded: i64,
    pub credits_rewarded: i64,
    pub duration_days: i64,
    pub difficulty_id: i64,
}

pub fn validate(input: &ChallengeInput) -> Result<(), AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".into()));
    }
    if input.points_rewarded < 0 || input.points_rewarded >= POINTS_CAP {
        return Err(AppError::Validation(format!(
            "points_rewarded must be between 0 and {}",
            POINTS_CAP - 1
        )));
    }
    if input.credits_rewarded < 0 || input.credits_rewarded >= CREDITS_CAP {
        return Err(AppError::Validation(format!(
            "credits_rewarded must be between 0 and {}",
            CREDITS_CAP - 1
        )));
    }
    if input.duration_days < 1 || input.duration_days > MAX_DURATION_DAYS {
        return Err(AppError::Validation(format!(
            "duration_days must be between 1 and {}",
            MAX_DURATION_DAYS
        )));
    }

    let (_, name, min, max) = DIFFICULTY_BANDS
        .iter()
        .find(|(id, ..)| *id == input.difficulty_id)
        .ok_or_else(|| {
            AppError::Validation(format!("Unknown difficulty id {}", input.difficulty_id))
        })?;

    let total = input.points_rewarded + input.credits_rewarded;
    let in_band = total >= *min && max.map_or(true, |m| total <= m);
    if !in_band {
        let range = match max {
            Some(m) => format!("{} to {}", min, m),
            None => format!("{} or more", min),
        };
        return Err(AppError::Validation(format!(
            "Total reward {} is outside the {} band ({})",
            total, name, range
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(points: i64, credits: i64, difficulty_id: i64) -> ChallengeInput<'static> {
        ChallengeInput {
            title: "Patrol the nebula",
            points_rewarded: points,
            credits_rewarded: credits,
            duration_days: 7,
            difficulty_id,
        }
    }

    #[test]
    fn easy_challenge_within_band_is_accepted() {
        // total 45 <= 50
        assert!(validate(&input(30, 15, 1)).is_ok());
    }

    #[test]
    fn easy_challenge_over_band_is_rejected() {
        // total 60 > 50
        let err = validate(&input(40, 20, 1)).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("Easy")));
    }

    #[test]
    fn medium_and_hard_bands() {
        assert!(validate(&input(40, 20, 2)).is_ok()); // 60 in 51..=100
        assert!(validate(&input(30, 15, 2)).is_err()); // 45 below 51
        assert!(validate(&input(80, 30, 3)).is_ok()); // 110 >= 101
        assert!(validate(&input(50, 40, 3)).is_err()); // 90 below 101
    }

    #[test]
    fn reward_caps_are_exclusive() {
        assert!(validate(&input(90, 0, 2)).is_err());
        assert!(validate(&input(89, 0, 2)).is_ok());
        assert!(validate(&input(0, 60, 2)).is_err());
        assert!(validate(&input(30, 59, 2)).is_ok());
    }

    #[test]
    fn negative_rewards_are_rejected() {
        assert!(validate(&input(-1, 10, 1)).is_err());
        assert!(validate(&input(10, -1, 1)).is_err());
    }

    #[test]
    fn duration_bounds() {
        let mut i = input(30, 15, 1);
        i.duration_days = 0;
        assert!(validate(&i).is_err());
        i.duration_days = 366;
        assert!(validate(&i).is_err());
        i.duration_days = 365;
        assert!(validate(&i).is_ok());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut i = input(30, 15, 1);
        i.title = "   ";
        assert!(matches!(validate(&i).unwrap_err(), AppError::Validation(_)));
    }

    #[test]
    fn unknown_difficulty_is_rejected() {
        assert!(validate(&input(30, 15, 9)).is_err());
    }
}
