//! # Row Codec Module
//!
//! Maps `Session` records to bound parameters and result rows back to
//! sessions. Composite fields (series, scoreboard, warning events) travel as
//! JSON text.
//!
//! Serialization never fails the caller: a value that cannot be encoded is
//! stored as NULL, and a column that cannot be decoded reads back as `None`.
//! Both cases are logged.

use super::engine::{Row, SqlValue};
use crate::session::{GameMode, HistoryItem, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Insert column list, in bind order
pub const INSERT_COLUMNS: &[&str] = &[
    "mode",
    "start_time",
    "end_time",
    "duration",
    "calories",
    "max_speed",
    "avg_heart_rate",
    "max_heart_rate",
    "min_heart_rate",
    "strokes",
    "smashes",
    "forehand",
    "backhand",
    "notes",
    "heart_rate_series",
    "speed_series",
    "scoreboard",
    "heart_rate_warning_events",
    "updated_at",
];

pub fn encode_composite<T: Serialize + ?Sized>(field: &str, value: Option<&T>) -> SqlValue {
    let Some(value) = value else {
        return SqlValue::Null;
    };
    match serde_json::to_string(value) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => {
            log::warn!("Failed to serialize {}, storing NULL: {}", field, e);
            SqlValue::Null
        }
    }
}

pub fn decode_composite<T: DeserializeOwned>(field: &str, raw: Option<&str>) -> Option<T> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Failed to parse stored {}, reading as empty: {}", field, e);
            None
        }
    }
}

/// Bind values matching `INSERT_COLUMNS`
pub fn insert_args(session: &Session, updated_at: i64) -> Vec<SqlValue> {
    vec![
        session.mode.as_str().into(),
        session.start_time.into(),
        session.end_time.into(),
        session.duration.into(),
        session.calories.into(),
        session.max_speed.into(),
        session.avg_heart_rate.into(),
        session.max_heart_rate.into(),
        session.min_heart_rate.into(),
        session.strokes.into(),
        session.smashes.into(),
        session.forehand.into(),
        session.backhand.into(),
        session.notes.as_str().into(),
        encode_composite("heart_rate_series", session.heart_rate_series.as_ref()),
        encode_composite("speed_series", session.speed_series.as_ref()),
        encode_composite("scoreboard", session.scoreboard.as_ref()),
        encode_composite("heart_rate_warning_events", session.heart_rate_warning_events.as_ref()),
        updated_at.into(),
    ]
}

pub fn insert_sql() -> String {
    let placeholders = vec!["?"; INSERT_COLUMNS.len()].join(", ");
    format!(
        "INSERT INTO sessions ({}) VALUES ({})",
        INSERT_COLUMNS.join(", "),
        placeholders
    )
}

fn count(row: &Row, column: &str) -> u32 {
    row.i64(column).and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

fn mode(row: &Row) -> GameMode {
    row.text("mode").map(GameMode::from_label).unwrap_or_default()
}

pub fn session_from_row(row: &Row) -> Session {
    Session {
        id: row.i64("id"),
        mode: mode(row),
        start_time: row.i64("start_time").unwrap_or(0),
        // Legacy rows store 0 for "not finished"
        end_time: row.i64("end_time").filter(|t| *t > 0),
        duration: row.i64("duration").unwrap_or(0),
        calories: row.f64("calories").unwrap_or(0.0),
        max_speed: row.f64("max_speed").unwrap_or(0.0),
        avg_heart_rate: row.f64("avg_heart_rate").unwrap_or(0.0),
        max_heart_rate: row.f64("max_heart_rate").unwrap_or(0.0),
        min_heart_rate: row.f64("min_heart_rate").unwrap_or(0.0),
        strokes: count(row, "strokes"),
        smashes: count(row, "smashes"),
        forehand: count(row, "forehand"),
        backhand: count(row, "backhand"),
        notes: row.text("notes").unwrap_or_default().to_string(),
        heart_rate_series: decode_composite("heart_rate_series", row.text("heart_rate_series")),
        speed_series: decode_composite("speed_series", row.text("speed_series")),
        scoreboard: decode_composite("scoreboard", row.text("scoreboard")),
        heart_rate_warning_events: decode_composite(
            "heart_rate_warning_events",
            row.text("heart_rate_warning_events"),
        ),
        updated_at: row.i64("updated_at"),
    }
}

pub fn history_item_from_row(row: &Row) -> HistoryItem {
    HistoryItem {
        id: row.i64("id").unwrap_or(0),
        mode: mode(row),
        date: row.i64("start_time").unwrap_or(0),
        duration: row.i64("duration").unwrap_or(0),
        calories: row.f64("calories").unwrap_or(0.0),
        strokes: count(row, "strokes"),
        avg_heart_rate: row.f64("avg_heart_rate").unwrap_or(0.0),
        max_heart_rate: row.f64("max_heart_rate").unwrap_or(0.0),
        min_heart_rate: row.f64("min_heart_rate").unwrap_or(0.0),
        max_speed: row.f64("max_speed").unwrap_or(0.0),
        smashes: count(row, "smashes"),
        forehand: count(row, "forehand"),
        backhand: count(row, "backhand"),
    }
}
