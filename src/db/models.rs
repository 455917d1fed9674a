use serde::{Deserialize, Serialize};

/// A user row, minus the password hash. Queries that feed these structs must
/// never select the hash column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub description: Option<String>,
    pub points: i64,
    pub credits: i64,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Difficulty {
    pub id: i64,
    pub name: String,
    pub min_value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub points_rewarded: i64,
    pub credits_rewarded: i64,
    pub duration_days: i64,
    pub creator_id: Option<i64>,
    pub difficulty_id: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}
