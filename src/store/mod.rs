//! # Session Store Module
//!
//! Async persistence for finished sessions and user settings.
//!
//! ## Architecture
//! - **Engine** (`engine`): parameterized SQL seam and the SQLite backend
//! - **Schema** (`schema`): versioned migrations run once per store
//! - **Codec** (`codec`): session rows and JSON composite columns
//! - **Patch** (`patch`): validated partial updates
//!
//! ## Failure Policy
//! Listing and aggregate reads are read-soft: they return a `ReadOutcome`,
//! which always carries a usable value and says whether it is a fallback.
//! Writes and single-record lookups are write-strict: bad arguments are
//! rejected before any I/O and engine errors are returned unchanged.
//!
//! ## Initialization
//! The first operation (or an explicit `init`) opens the database and runs
//! migrations. Concurrent callers await the same attempt. A failed attempt is
//! not remembered, so the next call tries again.

pub mod codec;
pub mod engine;
pub mod patch;
pub mod schema;

pub use engine::{SqlEngine, SqlOutcome, SqlValue, SqliteBackend, StoreBackend};
pub use patch::SessionPatch;

use crate::clock::{system_clock, Clock};
use crate::config::Config;
use crate::error::StoreError;
use crate::session::{HistoryPage, RangeStats, Session, Settings};
use crate::timeseries::SeriesPoint;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Page size used when a caller asks for less than one row per page
pub const DEFAULT_PAGE_SIZE: u64 = 20;

const SESSION_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(capacity) => capacity,
    None => panic!("cache capacity must be non-zero"),
};

/// Result of a read-soft operation
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    /// Value read from the store
    Fresh(T),
    /// Safe default returned after a logged failure
    Fallback(T),
}

impl<T> ReadOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            ReadOutcome::Fresh(value) | ReadOutcome::Fallback(value) => value,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            ReadOutcome::Fresh(value) | ReadOutcome::Fallback(value) => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ReadOutcome::Fallback(_))
    }
}

fn validate_id(id: i64) -> Result<(), StoreError> {
    if id <= 0 {
        return Err(StoreError::InvalidArgument(format!("invalid session id {}", id)));
    }
    Ok(())
}

/// Single-session read cache. `generation` moves on every invalidation, so a
/// lookup that raced a write never stores the row it read before the write.
struct SessionCache {
    entries: LruCache<i64, Session>,
    generation: u64,
}

pub struct SessionStore {
    backend: Arc<dyn StoreBackend>,
    name: String,
    version: u32,
    engine: OnceCell<Arc<dyn SqlEngine>>,
    cache: Mutex<SessionCache>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn StoreBackend>, name: impl Into<String>, version: u32) -> Self {
        Self::with_clock(backend, name, version, system_clock())
    }

    pub fn with_clock(backend: Arc<dyn StoreBackend>, name: impl Into<String>, version: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            name: name.into(),
            version,
            engine: OnceCell::new(),
            cache: Mutex::new(SessionCache {
                entries: LruCache::new(SESSION_CACHE_CAPACITY),
                generation: 0,
            }),
            clock,
        }
    }

    /// SQLite store at the location named by the config
    pub fn open(config: &Config) -> Self {
        Self::new(
            Arc::new(SqliteBackend::in_dir(config.resolved_database_dir())),
            config.database_name.clone(),
            config.database_version,
        )
    }

    /// Private in-memory SQLite store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(SqliteBackend::in_memory()), "rallytrack.db", 1)
    }

    async fn engine(&self) -> Result<Arc<dyn SqlEngine>, StoreError> {
        self.engine
            .get_or_try_init(|| async {
                let engine = self.backend.open_or_create(&self.name, self.version).await?;
                let found = schema::migrate(engine.as_ref()).await?;
                log::info!(
                    "Session store '{}' ready (schema {} -> {})",
                    self.name,
                    found,
                    schema::SCHEMA_VERSION.max(found)
                );
                Ok::<_, StoreError>(engine)
            })
            .await
            .cloned()
    }

    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<SqlOutcome, StoreError> {
        let engine = self.engine().await?;
        engine.execute(sql, args).await
    }

    /// Open the database and apply pending migrations
    pub async fn init(&self) -> Result<(), StoreError> {
        self.engine().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }

    fn invalidate(&self, id: Option<i64>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.generation = cache.generation.wrapping_add(1);
            match id {
                Some(id) => {
                    cache.entries.pop(&id);
                }
                None => cache.entries.clear(),
            }
        }
    }

    /// Insert a new session row and return its id
    pub async fn save_session(&self, session: &Session) -> Result<i64, StoreError> {
        if let Some(end) = session.end_time.filter(|&end| end < session.start_time) {
            return Err(StoreError::InvalidArgument(format!(
                "end time {} is before start time {}",
                end, session.start_time
            )));
        }
        let args = codec::insert_args(session, self.clock.now_ms());
        let outcome = self.execute(&codec::insert_sql(), &args).await.map_err(|e| {
            log::error!("Failed to save session: {}", e);
            e
        })?;
        log::info!("Saved {} session {}", session.mode, outcome.insert_id);
        Ok(outcome.insert_id)
    }

    /// Sessions newest first. `limit` 0 returns every row and ignores `offset`.
    pub async fn get_all_sessions(&self, limit: u64, offset: u64) -> ReadOutcome<Vec<Session>> {
        let result = if limit > 0 {
            self.execute(
                "SELECT * FROM sessions ORDER BY start_time DESC LIMIT ? OFFSET ?",
                &[to_sql_count(limit), to_sql_count(offset)],
            )
            .await
        } else {
            self.execute("SELECT * FROM sessions ORDER BY start_time DESC", &[]).await
        };

        match result {
            Ok(outcome) => ReadOutcome::Fresh(outcome.rows.iter().map(codec::session_from_row).collect()),
            Err(e) => {
                log::warn!("Failed to list sessions: {}", e);
                ReadOutcome::Fallback(Vec::new())
            }
        }
    }

    /// One page of history summaries, newest first. Pages start at 1; a page
    /// below 1 reads page 1 and a page size below 1 uses `DEFAULT_PAGE_SIZE`.
    pub async fn get_history_list(&self, page: i64, page_size: i64) -> ReadOutcome<HistoryPage> {
        let page = if page < 1 { 1 } else { page as u64 };
        let page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size as u64
        };

        match self.history_page(page, page_size).await {
            Ok(history) => ReadOutcome::Fresh(history),
            Err(e) => {
                log::warn!("Failed to load history page {}: {}", page, e);
                ReadOutcome::Fallback(HistoryPage::empty(page, page_size))
            }
        }
    }

    async fn history_page(&self, page: u64, page_size: u64) -> Result<HistoryPage, StoreError> {
        let count = self.execute("SELECT COUNT(*) AS total FROM sessions", &[]).await?;
        let total = count
            .rows
            .first()
            .and_then(|row| row.i64("total"))
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0);

        let offset = (page - 1).saturating_mul(page_size);
        let rows = self
            .execute(
                "SELECT * FROM sessions ORDER BY start_time DESC LIMIT ? OFFSET ?",
                &[to_sql_count(page_size), to_sql_count(offset)],
            )
            .await?;

        Ok(HistoryPage {
            total,
            items: rows.rows.iter().map(codec::history_item_from_row).collect(),
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    /// Aggregates over sessions starting in `[start_time, end_time)`
    pub async fn get_stats_by_range(&self, start_time: i64, end_time: i64) -> ReadOutcome<RangeStats> {
        if start_time < 0 || end_time <= start_time {
            log::warn!("Invalid stats range [{}, {})", start_time, end_time);
            return ReadOutcome::Fallback(RangeStats::default());
        }

        let result = self
            .execute(
                "SELECT start_time, duration, calories, strokes, avg_heart_rate, max_speed
                 FROM sessions WHERE start_time >= ? AND start_time < ? ORDER BY start_time ASC",
                &[start_time.into(), end_time.into()],
            )
            .await;

        let rows = match result {
            Ok(outcome) => outcome.rows,
            Err(e) => {
                log::warn!("Failed to aggregate sessions: {}", e);
                return ReadOutcome::Fallback(RangeStats::default());
            }
        };

        let mut stats = RangeStats::default();
        let mut total_calories = 0.0;
        let mut weighted_heart_rate = 0.0;
        for row in &rows {
            let start = row.i64("start_time").unwrap_or(0);
            let duration = row.i64("duration").unwrap_or(0);
            let avg_heart_rate = row.f64("avg_heart_rate").unwrap_or(0.0);

            stats.total_duration += duration;
            total_calories += row.f64("calories").unwrap_or(0.0);
            stats.total_strokes += row.i64("strokes").and_then(|v| u64::try_from(v).ok()).unwrap_or(0);
            weighted_heart_rate += avg_heart_rate * duration as f64;

            stats.heart_rate_series.push(SeriesPoint::new(start, avg_heart_rate));
            stats
                .speed_series
                .push(SeriesPoint::new(start, row.f64("max_speed").unwrap_or(0.0)));
        }

        stats.total_calories = total_calories.round() as i64;
        if stats.total_duration > 0 {
            stats.avg_heart_rate = (weighted_heart_rate / stats.total_duration as f64).round();
        }
        ReadOutcome::Fresh(stats)
    }

    pub async fn get_session_by_id(&self, id: i64) -> Result<Session, StoreError> {
        validate_id(id)?;

        let mut generation = None;
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(session) = cache.entries.get(&id) {
                return Ok(session.clone());
            }
            generation = Some(cache.generation);
        }

        let outcome = self
            .execute("SELECT * FROM sessions WHERE id = ?", &[id.into()])
            .await?;
        let session = outcome
            .rows
            .first()
            .map(codec::session_from_row)
            .ok_or(StoreError::NotFound(id))?;

        if let Ok(mut cache) = self.cache.lock() {
            if generation == Some(cache.generation) {
                cache.entries.put(id, session.clone());
            }
        }
        Ok(session)
    }

    /// Apply `patch` to one session. An empty patch returns 0 without touching
    /// the database. A patch moving the start or end is checked against the
    /// stored row so the session never ends before it starts.
    pub async fn update_session(&self, id: i64, patch: &SessionPatch) -> Result<u64, StoreError> {
        validate_id(id)?;
        if patch.is_empty() {
            return Ok(0);
        }

        if patch.touches_times() {
            let stored = self
                .execute("SELECT start_time, end_time FROM sessions WHERE id = ?", &[id.into()])
                .await?;
            let Some(row) = stored.rows.first() else {
                return Ok(0);
            };
            patch.check_times(row.i64("start_time").unwrap_or(0), row.i64("end_time"))?;
        }

        let (sql, args) = patch.to_update(id, self.clock.now_ms());
        let outcome = self.execute(&sql, &args).await;
        self.invalidate(Some(id));

        let outcome = outcome.map_err(|e| {
            log::error!("Failed to update session {}: {}", id, e);
            e
        })?;
        log::debug!("Updated session {} ({} fields)", id, patch.len());
        Ok(outcome.rows_affected)
    }

    pub async fn delete_session(&self, id: i64) -> Result<u64, StoreError> {
        validate_id(id)?;
        let outcome = self.execute("DELETE FROM sessions WHERE id = ?", &[id.into()]).await;
        self.invalidate(Some(id));

        let outcome = outcome.map_err(|e| {
            log::error!("Failed to delete session {}: {}", id, e);
            e
        })?;
        log::info!("Deleted session {}", id);
        Ok(outcome.rows_affected)
    }

    /// Remove every session. Settings are kept.
    pub async fn clear_all_data(&self) -> Result<u64, StoreError> {
        let outcome = self.execute("DELETE FROM sessions", &[]).await;
        self.invalidate(None);

        let outcome = outcome.map_err(|e| {
            log::error!("Failed to clear sessions: {}", e);
            e
        })?;
        log::info!("Cleared {} sessions", outcome.rows_affected);
        Ok(outcome.rows_affected)
    }

    /// Update the stored row when `session` carries an id, insert otherwise.
    /// Returns the row id.
    pub async fn save_report(&self, session: &Session) -> Result<i64, StoreError> {
        match session.id {
            Some(id) => {
                let affected = self.update_session(id, &SessionPatch::from_session(session)).await?;
                if affected == 0 {
                    return Err(StoreError::NotFound(id));
                }
                Ok(id)
            }
            None => self.save_session(session).await,
        }
    }

    /// Stored settings. `Fresh(None)` when none were saved yet.
    pub async fn get_user_settings(&self) -> ReadOutcome<Option<Settings>> {
        let outcome = match self.execute("SELECT data FROM user_settings WHERE id = 1", &[]).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Failed to read user settings: {}", e);
                return ReadOutcome::Fallback(None);
            }
        };

        let Some(data) = outcome.rows.first().and_then(|row| row.text("data").map(String::from)) else {
            return ReadOutcome::Fresh(None);
        };

        match serde_json::from_str::<Settings>(&data) {
            Ok(settings) => ReadOutcome::Fresh(Some(settings)),
            Err(e) => {
                log::warn!("Stored user settings are unreadable: {}", e);
                ReadOutcome::Fallback(None)
            }
        }
    }

    pub async fn save_user_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let data = serde_json::to_string(settings)
            .map_err(|e| StoreError::InvalidArgument(format!("settings not serializable: {}", e)))?;
        self.execute(
            "INSERT INTO user_settings (id, data, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            &[data.into(), self.clock.now_ms().into()],
        )
        .await?;
        log::debug!("Saved user settings");
        Ok(())
    }
}

fn to_sql_count(value: u64) -> SqlValue {
    SqlValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}
