//! # Session Patch Module
//!
//! Partial updates for stored sessions. A patch only touches the columns it
//! names; `updated_at` is bumped by the store on every non-empty update.
//!
//! ## Sources
//! - `SessionPatch::from_json`: camelCase JSON object, as sent by a UI layer
//! - `SessionPatch::from_session`: every mutable field of a full record
//! - builder methods for single fields (`notes`, `scoreboard`, ...)
//!
//! Column names come from a fixed table, never from caller input.

use super::codec::encode_composite;
use super::engine::SqlValue;
use crate::error::StoreError;
use crate::session::{GameMode, HeartRateWarningEvent, Session};
use crate::timeseries::SeriesPoint;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Integer,
    Real,
    Text,
    Mode,
    Series,
    WarningEvents,
    Scoreboard,
}

/// (camelCase key, column, kind) for every patchable column
const COLUMNS: &[(&str, &str, ColumnKind)] = &[
    ("mode", "mode", ColumnKind::Mode),
    ("startTime", "start_time", ColumnKind::Integer),
    ("endTime", "end_time", ColumnKind::Integer),
    ("duration", "duration", ColumnKind::Integer),
    ("calories", "calories", ColumnKind::Real),
    ("maxSpeed", "max_speed", ColumnKind::Real),
    ("avgHeartRate", "avg_heart_rate", ColumnKind::Real),
    ("maxHeartRate", "max_heart_rate", ColumnKind::Real),
    ("minHeartRate", "min_heart_rate", ColumnKind::Real),
    ("strokes", "strokes", ColumnKind::Integer),
    ("smashes", "smashes", ColumnKind::Integer),
    ("forehand", "forehand", ColumnKind::Integer),
    ("backhand", "backhand", ColumnKind::Integer),
    ("notes", "notes", ColumnKind::Text),
    ("heartRateSeries", "heart_rate_series", ColumnKind::Series),
    ("speedSeries", "speed_series", ColumnKind::Series),
    ("scoreboard", "scoreboard", ColumnKind::Scoreboard),
    ("heartRateWarningEvents", "heart_rate_warning_events", ColumnKind::WarningEvents),
];

fn lookup(key: &str) -> Option<(&'static str, ColumnKind)> {
    COLUMNS
        .iter()
        .find(|(camel, column, _)| *camel == key || *column == key)
        .map(|(_, column, kind)| (*column, *kind))
}

fn invalid(key: &str, expected: &str) -> StoreError {
    StoreError::InvalidArgument(format!("field '{}' must be {}", key, expected))
}

fn convert(key: &str, column: &'static str, kind: ColumnKind, value: &Value) -> Result<SqlValue, StoreError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match kind {
        ColumnKind::Integer => value
            .as_i64()
            .or_else(|| value.as_f64().map(|v| v.round() as i64))
            .map(SqlValue::Integer)
            .ok_or_else(|| invalid(key, "a number")),
        ColumnKind::Real => value.as_f64().map(SqlValue::Real).ok_or_else(|| invalid(key, "a number")),
        ColumnKind::Text => value
            .as_str()
            .map(SqlValue::from)
            .ok_or_else(|| invalid(key, "a string")),
        ColumnKind::Mode => value
            .as_str()
            .and_then(|s| s.parse::<GameMode>().ok())
            .map(|mode| SqlValue::from(mode.as_str()))
            .ok_or_else(|| invalid(key, "one of singles, doubles, mixed")),
        ColumnKind::Series => typed::<Vec<SeriesPoint>>(key, column, value, "a list of {timestamp, value} points"),
        ColumnKind::WarningEvents => typed::<Vec<HeartRateWarningEvent>>(
            key,
            column,
            value,
            "a list of {timestamp, type, value, threshold} events",
        ),
        ColumnKind::Scoreboard => Ok(encode_composite(column, Some(value))),
    }
}

/// Decode `value` as `T` and re-encode it the way inserts do
fn typed<T: DeserializeOwned + Serialize>(
    key: &str,
    column: &'static str,
    value: &Value,
    expected: &str,
) -> Result<SqlValue, StoreError> {
    let decoded: T = serde_json::from_value(value.clone()).map_err(|_| invalid(key, expected))?;
    Ok(encode_composite(column, Some(&decoded)))
}

/// Set of column assignments for one `UPDATE`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    assignments: BTreeMap<&'static str, SqlValue>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from a JSON object of camelCase fields.
    ///
    /// Rejects non-objects, unknown fields (including `id` and `updatedAt`)
    /// and values of the wrong type.
    pub fn from_json(updates: &Value) -> Result<Self, StoreError> {
        let object = updates
            .as_object()
            .ok_or_else(|| StoreError::InvalidArgument("updates must be a JSON object".to_string()))?;

        let mut patch = Self::new();
        for (key, value) in object {
            let (column, kind) =
                lookup(key).ok_or_else(|| StoreError::InvalidArgument(format!("unknown session field '{}'", key)))?;
            patch.assignments.insert(column, convert(key, column, kind, value)?);
        }
        Ok(patch)
    }

    /// Every mutable field of `session`
    pub fn from_session(session: &Session) -> Self {
        Self::new()
            .mode(session.mode)
            .set("start_time", session.start_time.into())
            .end_time(session.end_time)
            .duration(session.duration)
            .calories(session.calories)
            .set("max_speed", session.max_speed.into())
            .set("avg_heart_rate", session.avg_heart_rate.into())
            .set("max_heart_rate", session.max_heart_rate.into())
            .set("min_heart_rate", session.min_heart_rate.into())
            .set("strokes", session.strokes.into())
            .set("smashes", session.smashes.into())
            .set("forehand", session.forehand.into())
            .set("backhand", session.backhand.into())
            .notes(&session.notes)
            .heart_rate_series(session.heart_rate_series.as_deref())
            .speed_series(session.speed_series.as_deref())
            .scoreboard(session.scoreboard.as_ref())
            .heart_rate_warning_events(session.heart_rate_warning_events.as_deref())
    }

    fn set(mut self, column: &'static str, value: SqlValue) -> Self {
        self.assignments.insert(column, value);
        self
    }

    pub fn mode(self, mode: GameMode) -> Self {
        self.set("mode", mode.as_str().into())
    }

    pub fn end_time(self, end_time: Option<i64>) -> Self {
        self.set("end_time", end_time.into())
    }

    pub fn duration(self, seconds: i64) -> Self {
        self.set("duration", seconds.into())
    }

    pub fn calories(self, calories: f64) -> Self {
        self.set("calories", calories.into())
    }

    pub fn notes(self, notes: &str) -> Self {
        self.set("notes", notes.into())
    }

    pub fn heart_rate_series(self, series: Option<&[SeriesPoint]>) -> Self {
        self.set("heart_rate_series", encode_composite("heart_rate_series", series))
    }

    pub fn speed_series(self, series: Option<&[SeriesPoint]>) -> Self {
        self.set("speed_series", encode_composite("speed_series", series))
    }

    pub fn scoreboard(self, scoreboard: Option<&Value>) -> Self {
        self.set("scoreboard", encode_composite("scoreboard", scoreboard))
    }

    pub fn heart_rate_warning_events(self, events: Option<&[HeartRateWarningEvent]>) -> Self {
        self.set(
            "heart_rate_warning_events",
            encode_composite("heart_rate_warning_events", events),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.assignments.get(column)
    }

    /// True when the patch moves the start or the end of the session
    pub fn touches_times(&self) -> bool {
        self.assignments.contains_key("start_time") || self.assignments.contains_key("end_time")
    }

    /// Reject a patch that would leave the stored session ending before it
    /// starts. An end time of 0 or NULL means "not ended".
    pub fn check_times(&self, stored_start: i64, stored_end: Option<i64>) -> Result<(), StoreError> {
        let start = match self.assignments.get("start_time") {
            Some(SqlValue::Integer(start)) => *start,
            Some(_) => 0,
            None => stored_start,
        };
        let end = match self.assignments.get("end_time") {
            Some(SqlValue::Integer(end)) => Some(*end),
            Some(_) => None,
            None => stored_end,
        };
        match end {
            Some(end) if end != 0 && end < start => Err(StoreError::InvalidArgument(format!(
                "end time {} is before start time {}",
                end, start
            ))),
            _ => Ok(()),
        }
    }

    /// `UPDATE` statement and its bind values, `updated_at` and the id last
    pub fn to_update(&self, id: i64, updated_at: i64) -> (String, Vec<SqlValue>) {
        let mut clauses: Vec<String> = self.assignments.keys().map(|c| format!("{} = ?", c)).collect();
        clauses.push("updated_at = ?".to_string());

        let mut args: Vec<SqlValue> = self.assignments.values().cloned().collect();
        args.push(updated_at.into());
        args.push(id.into());

        (format!("UPDATE sessions SET {} WHERE id = ?", clauses.join(", ")), args)
    }
}
