//! # SQL Engine Module
//!
//! Parameterized-SQL seam the session store talks to, plus the SQLite backend.
//!
//! ## Key Types
//! - `SqlEngine`: `execute(sql, args)` returning `{rows, rows_affected, insert_id}`
//! - `StoreBackend`: Opens or creates a named store at a given version
//! - `SqliteBackend` / `SqliteEngine`: rusqlite implementation (file or memory)
//!
//! ## Threading
//! rusqlite connections are blocking. Every statement runs on tokio's blocking
//! pool behind a mutex, so one connection serves any number of async callers.

use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One bound parameter or result cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Raw bytes, also used for text cells that are not valid UTF-8
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) => Some(v.round() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(v) => Some(*v as f64),
            SqlValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => SqlValue::Text(text.to_string()),
                Err(_) => SqlValue::Blob(bytes.to_vec()),
            },
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Result row keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, SqlValue>,
}

impl Row {
    pub fn new(values: HashMap<String, SqlValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(SqlValue::as_f64)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlOutcome {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    /// Row id of the last insert on this connection
    pub insert_id: i64,
}

/// Parameterized SQL execution
#[async_trait]
pub trait SqlEngine: Send + Sync {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<SqlOutcome, StoreError>;
}

/// Opens the underlying store
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn open_or_create(&self, name: &str, version: u32) -> Result<Arc<dyn SqlEngine>, StoreError>;
}

/// SQLite databases in a directory, or private in-memory databases
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    dir: Option<PathBuf>,
}

impl SqliteBackend {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    /// Every `open_or_create` yields a fresh, empty database
    pub fn in_memory() -> Self {
        Self { dir: None }
    }
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    async fn open_or_create(&self, name: &str, version: u32) -> Result<Arc<dyn SqlEngine>, StoreError> {
        let path = self.dir.as_ref().map(|dir| dir.join(name));

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            match path {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            StoreError::InvalidArgument(format!("cannot create {}: {}", parent.display(), e))
                        })?;
                    }
                    log::info!("Opening session database at {}", path.display());
                    Ok(Connection::open(&path)?)
                }
                None => {
                    log::debug!("Opening in-memory session database");
                    Ok(Connection::open_in_memory()?)
                }
            }
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;

        log::debug!("Database '{}' opened (requested version {})", name, version);
        Ok(Arc::new(SqliteEngine::new(conn)))
    }
}

pub struct SqliteEngine {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEngine {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn run_statement(conn: &Connection, sql: &str, args: &[SqlValue]) -> Result<SqlOutcome, StoreError> {
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() == 0 {
        let rows_affected = stmt.execute(params_from_iter(args.iter()))?;
        return Ok(SqlOutcome {
            rows: Vec::new(),
            rows_affected: rows_affected as u64,
            insert_id: conn.last_insert_rowid(),
        });
    }

    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut cursor = stmt.query(params_from_iter(args.iter()))?;
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        let mut values = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            values.insert(name.clone(), SqlValue::from(row.get_ref(i)?));
        }
        rows.push(Row::new(values));
    }

    Ok(SqlOutcome {
        rows,
        rows_affected: 0,
        insert_id: 0,
    })
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<SqlOutcome, StoreError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let args = args.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Join("connection lock poisoned".to_string()))?;
            run_statement(&conn, &sql, &args)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_engine() -> Arc<dyn SqlEngine> {
        SqliteBackend::in_memory().open_or_create("test.db", 1).await.unwrap()
    }

    #[tokio::test]
    async fn test_execute_reports_insert_id_and_rows() {
        let engine = memory_engine().await;
        engine
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL)", &[])
            .await
            .unwrap();

        let first = engine
            .execute("INSERT INTO t (name, score) VALUES (?, ?)", &[SqlValue::from("a"), SqlValue::Real(1.5)])
            .await
            .unwrap();
        assert_eq!(first.insert_id, 1);
        assert_eq!(first.rows_affected, 1);

        let second = engine
            .execute("INSERT INTO t (name, score) VALUES (?, ?)", &[SqlValue::Null, SqlValue::Real(2.0)])
            .await
            .unwrap();
        assert_eq!(second.insert_id, 2);

        let result = engine.execute("SELECT * FROM t ORDER BY id", &[]).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].text("name"), Some("a"));
        assert_eq!(result.rows[0].f64("score"), Some(1.5));
        assert_eq!(result.rows[1].get("name"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn test_engine_errors_propagate() {
        let engine = memory_engine().await;
        let err = engine.execute("SELECT * FROM missing", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Engine(_)));
    }

    #[tokio::test]
    async fn test_file_backend_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::in_dir(dir.path().join("nested"));
        let engine = backend.open_or_create("sessions.db", 1).await.unwrap();
        engine.execute("CREATE TABLE t (x INTEGER)", &[]).await.unwrap();
        assert!(dir.path().join("nested").join("sessions.db").exists());
    }

    #[tokio::test]
    async fn test_blob_cells_keep_their_bytes() {
        let engine = memory_engine().await;
        engine.execute("CREATE TABLE t (data)", &[]).await.unwrap();
        engine.execute("INSERT INTO t (data) VALUES (X'FF00FE')", &[]).await.unwrap();
        engine
            .execute("INSERT INTO t (data) VALUES (?)", &[SqlValue::Blob(vec![1, 2])])
            .await
            .unwrap();

        let result = engine.execute("SELECT data FROM t ORDER BY rowid", &[]).await.unwrap();
        assert_eq!(result.rows[0].get("data"), Some(&SqlValue::Blob(vec![0xFF, 0x00, 0xFE])));
        assert_eq!(result.rows[0].text("data"), None);
        assert_eq!(result.rows[1].get("data"), Some(&SqlValue::Blob(vec![1, 2])));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3i64)), SqlValue::Integer(3));
        assert_eq!(SqlValue::Real(2.6).as_i64(), Some(3));
    }
}
