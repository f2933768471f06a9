//! # Schema Migration Module
//!
//! Versioned, ordered migrations for the session database.
//!
//! ## Version Record
//! `schema_meta` holds a single row (id = 1) with the highest applied version.
//! A store without that row is at version 0 and replays every step.
//!
//! ## Legacy Stores
//! Databases created before the version record existed may already carry some
//! of the newer columns. Every step is therefore safe to re-run: tables and
//! indexes use `IF NOT EXISTS`, and an `ADD COLUMN` for a column that already
//! exists counts as applied.

use super::engine::{SqlEngine, SqlValue};
use crate::error::StoreError;

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "sessions, start time index and user settings",
        statements: &[
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mode TEXT,
                start_time INTEGER,
                end_time INTEGER,
                duration INTEGER,
                calories REAL,
                max_speed REAL,
                avg_heart_rate REAL,
                max_heart_rate REAL,
                min_heart_rate REAL,
                strokes INTEGER,
                smashes INTEGER,
                forehand INTEGER,
                backhand INTEGER,
                notes TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time)",
            "CREATE TABLE IF NOT EXISTS user_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT,
                updated_at INTEGER
            )",
        ],
    },
    Migration {
        version: 2,
        description: "heart rate series",
        statements: &["ALTER TABLE sessions ADD COLUMN heart_rate_series TEXT"],
    },
    Migration {
        version: 3,
        description: "speed series",
        statements: &["ALTER TABLE sessions ADD COLUMN speed_series TEXT"],
    },
    Migration {
        version: 4,
        description: "row update time",
        statements: &["ALTER TABLE sessions ADD COLUMN updated_at INTEGER"],
    },
    Migration {
        version: 5,
        description: "scoreboard",
        statements: &["ALTER TABLE sessions ADD COLUMN scoreboard TEXT"],
    },
    Migration {
        version: 6,
        description: "heart rate warning events",
        statements: &["ALTER TABLE sessions ADD COLUMN heart_rate_warning_events TEXT"],
    },
];

/// Version a fully migrated store reports
pub const SCHEMA_VERSION: u32 = 6;

const CREATE_META_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
)";

const RECORD_VERSION_SQL: &str = "INSERT INTO schema_meta (id, version) VALUES (1, ?)
    ON CONFLICT(id) DO UPDATE SET version = excluded.version";

fn is_duplicate_column(err: &StoreError) -> bool {
    matches!(err, StoreError::Engine(e) if e.to_string().contains("duplicate column name"))
}

/// Applied version, 0 for a new or legacy store
pub async fn stored_version(engine: &dyn SqlEngine) -> Result<u32, StoreError> {
    engine.execute(CREATE_META_SQL, &[]).await?;
    let result = engine.execute("SELECT version FROM schema_meta WHERE id = 1", &[]).await?;
    Ok(result
        .rows
        .first()
        .and_then(|row| row.i64("version"))
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0))
}

async fn apply(engine: &dyn SqlEngine, migration: &Migration) -> Result<(), StoreError> {
    for sql in migration.statements {
        match engine.execute(sql, &[]).await {
            Ok(_) => {}
            Err(e) if is_duplicate_column(&e) => {
                log::debug!("Migration {}: column already present", migration.version);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Bring the store up to `SCHEMA_VERSION`. Returns the version found before
/// migrating.
pub async fn migrate(engine: &dyn SqlEngine) -> Result<u32, StoreError> {
    let found = stored_version(engine).await?;

    if found > SCHEMA_VERSION {
        log::warn!(
            "Session database is at schema version {}, newer than supported {}",
            found,
            SCHEMA_VERSION
        );
        return Ok(found);
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > found) {
        log::info!("Applying schema migration {}: {}", migration.version, migration.description);
        apply(engine, migration)
            .await
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                source: Box::new(e),
            })?;
        engine
            .execute(RECORD_VERSION_SQL, &[SqlValue::from(migration.version)])
            .await?;
    }

    Ok(found)
}
