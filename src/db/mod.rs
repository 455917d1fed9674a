pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial",
        include_str!("../../migrations/001_initial.sql"),
    ),
    (
        "002_seed_reference",
        include_str!("../../migrations/002_seed_reference.sql"),
    ),
];

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::test_pool;
    use super::*;

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn migrations_run_successfully() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"ranks".to_string()));
        assert!(tables.contains(&"difficulties".to_string()));
        assert!(tables.contains(&"challenges".to_string()));
        assert!(tables.contains(&"user_completions".to_string()));
        assert!(tables.contains(&"ship_parts".to_string()));
        assert!(tables.contains(&"user_inventory".to_string()));
    }

    #[test]
    fn migrations_are_idempotent() {
        let pool = test_pool();
        run_migrations(&pool).unwrap(); // Should not error on second run

        let conn = pool.get().unwrap();
        let ranks: i64 = conn
            .query_row("SELECT COUNT(*) FROM ranks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(ranks, 6);
    }

    #[test]
    fn reference_data_is_seeded() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        let (name, max_slots): (String, i64) = conn
            .query_row(
                "SELECT name, max_slots FROM ranks ORDER BY min_points ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "Recruit");
        assert_eq!(max_slots, 5);

        let difficulties: i64 = conn
            .query_row("SELECT COUNT(*) FROM difficulties", [], |row| row.get(0))
            .unwrap();
        assert_eq!(difficulties, 3);

        let parts: i64 = conn
            .query_row("SELECT COUNT(*) FROM ship_parts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(parts, 3);
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (username, password_hash, email) VALUES ('alice', 'x', 'a@b.c')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO users (username, password_hash, email) VALUES ('alice', 'y', 'd@e.f')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn deleting_user_cascades_to_completions_and_inventory() {
        let pool = test_pool();
        let user_id = test_support::seed_user(&pool, "alice", 0, 500);
        let challenge_id = test_support::seed_challenge(&pool, "test", 10, 5, user_id);

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO user_completions (user_id, challenge_id) VALUES (?1, ?2)",
            params![user_id, challenge_id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO user_inventory (user_id, part_id) VALUES (?1, 1)",
            params![user_id],
        )
        .unwrap();

        conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .unwrap();

        let completions: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_completions", [], |row| {
                row.get(0)
            })
            .unwrap();
        let inventory: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_inventory", [], |row| row.get(0))
            .unwrap();
        assert_eq!(completions, 0);
        assert_eq!(inventory, 0);
    }
}
