//! # Session Data Model Module
//!
//! Records produced during and after an exercise session, plus the shapes the
//! store serves back to presentation layers.
//!
//! ## Key Types
//! - `Session`: One bounded exercise interval with its accumulated statistics
//! - `HeartRateWarningEvent`: Persisted record of a threshold crossing
//! - `Settings`: Singleton user preferences
//! - `HistoryPage` / `HistoryItem`: Paginated history listing
//! - `RangeStats`: Aggregates over a start-time window
//!
//! ## Lifecycle
//! A `Session` is created at session start, mutated while events arrive,
//! finished at stop and then inserted once. Later edits (notes) go through
//! `SessionStore::update_session`.

use crate::timeseries::SeriesPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Match format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Singles,
    Doubles,
    Mixed,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Singles => "singles",
            GameMode::Doubles => "doubles",
            GameMode::Mixed => "mixed",
        }
    }

    /// Case-insensitive parse. Unknown labels fall back to singles.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            log::warn!("Unknown game mode '{}', using singles", label);
            GameMode::Singles
        })
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "singles" => Ok(GameMode::Singles),
            "doubles" => Ok(GameMode::Doubles),
            "mixed" => Ok(GameMode::Mixed),
            other => Err(format!("unknown game mode: {}", other)),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a heart-rate threshold crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    Low,
    High,
}

/// One heart-rate warning raised during a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateWarningEvent {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub value: u32,
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Option<i64>,
    pub mode: GameMode,
    pub start_time: i64,
    pub end_time: Option<i64>,
    /// Seconds
    pub duration: i64,
    pub calories: f64,
    pub max_speed: f64,
    pub avg_heart_rate: f64,
    pub max_heart_rate: f64,
    pub min_heart_rate: f64,
    pub strokes: u32,
    pub smashes: u32,
    pub forehand: u32,
    pub backhand: u32,
    pub notes: String,
    pub heart_rate_series: Option<Vec<SeriesPoint>>,
    pub speed_series: Option<Vec<SeriesPoint>>,
    /// Opaque scoreboard payload owned by the presentation layer
    pub scoreboard: Option<serde_json::Value>,
    pub heart_rate_warning_events: Option<Vec<HeartRateWarningEvent>>,
    pub updated_at: Option<i64>,
}

impl Session {
    pub fn new(mode: GameMode, start_time: i64) -> Self {
        Self {
            id: None,
            mode,
            start_time,
            end_time: None,
            duration: 0,
            calories: 0.0,
            max_speed: 0.0,
            avg_heart_rate: 0.0,
            max_heart_rate: 0.0,
            min_heart_rate: 0.0,
            strokes: 0,
            smashes: 0,
            forehand: 0,
            backhand: 0,
            notes: String::new(),
            heart_rate_series: None,
            speed_series: None,
            scoreboard: None,
            heart_rate_warning_events: None,
            updated_at: None,
        }
    }

    /// Close the session at `end_time` and derive its duration in whole seconds.
    ///
    /// An end before the start is clamped to the start.
    pub fn finish(&mut self, end_time: i64) {
        let end_time = end_time.max(self.start_time);
        self.end_time = Some(end_time);
        self.duration = calculate_duration_secs(self.start_time, end_time);
    }

    pub fn elapsed_minutes(&self) -> f64 {
        self.duration as f64 / 60.0
    }

    /// Forehand and backhand partition the stroke total
    pub fn is_consistent(&self) -> bool {
        self.forehand + self.backhand == self.strokes
            && self.smashes <= self.strokes
            && self.end_time.map_or(true, |end| end >= self.start_time)
    }
}

/// Whole seconds between two millisecond timestamps
pub fn calculate_duration_secs(start_time: i64, end_time: i64) -> i64 {
    (end_time - start_time).div_euclid(1000)
}

/// User preferences, stored as one JSON blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub heart_rate_min: u32,
    pub heart_rate_max: u32,
    pub vibrate_on_warning: bool,
    pub sync_with_health: bool,
    pub dark_mode: bool,
    // Session behaviour defaults
    pub default_mode: GameMode,
    pub vibration_enabled: bool,
    pub sound_enabled: bool,
    pub auto_end_session: bool,
    /// Seconds without activity before a session ends itself
    pub auto_end_timeout: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heart_rate_min: 60,
            heart_rate_max: 180,
            vibrate_on_warning: true,
            sync_with_health: false,
            dark_mode: false,
            default_mode: GameMode::Singles,
            vibration_enabled: true,
            sound_enabled: true,
            auto_end_session: true,
            auto_end_timeout: 300,
        }
    }
}

/// Summary row of the history listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: i64,
    pub mode: GameMode,
    /// Session start time
    pub date: i64,
    pub duration: i64,
    pub calories: f64,
    pub strokes: u32,
    pub avg_heart_rate: f64,
    pub max_heart_rate: f64,
    pub min_heart_rate: f64,
    pub max_speed: f64,
    pub smashes: u32,
    pub forehand: u32,
    pub backhand: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub total: u64,
    pub items: Vec<HistoryItem>,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl HistoryPage {
    /// Zeroed page echoing the requested position
    pub fn empty(page: u64, page_size: u64) -> Self {
        Self {
            total: 0,
            items: Vec::new(),
            page,
            page_size,
            total_pages: 0,
        }
    }
}

/// Aggregates over sessions whose start time falls in a window
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeStats {
    pub total_duration: i64,
    pub total_calories: i64,
    pub total_strokes: u64,
    /// Duration-weighted mean of per-session average heart rate
    pub avg_heart_rate: f64,
    /// Per-session average heart rate keyed by start time
    pub heart_rate_series: Vec<SeriesPoint>,
    /// Per-session max speed keyed by start time
    pub speed_series: Vec<SeriesPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_parsing_is_case_insensitive() {
        assert_eq!(GameMode::from_label("DOUBLES"), GameMode::Doubles);
        assert_eq!(GameMode::from_label(" Mixed "), GameMode::Mixed);
        assert_eq!(GameMode::from_label("triples"), GameMode::Singles);
        assert!("triples".parse::<GameMode>().is_err());
    }

    #[test]
    fn test_finish_derives_duration() {
        let mut session = Session::new(GameMode::Singles, 1_000);
        session.finish(61_999);
        assert_eq!(session.end_time, Some(61_999));
        assert_eq!(session.duration, 60);
        assert!(session.is_consistent());
    }

    #[test]
    fn test_finish_clamps_end_before_start() {
        let mut session = Session::new(GameMode::Doubles, 5_000);
        session.finish(1_000);
        assert_eq!(session.end_time, Some(5_000));
        assert_eq!(session.duration, 0);
    }

    #[test]
    fn test_inconsistent_hand_counts_detected() {
        let mut session = Session::new(GameMode::Singles, 0);
        session.strokes = 3;
        session.forehand = 1;
        session.backhand = 1;
        assert!(!session.is_consistent());
    }

    #[test]
    fn test_warning_event_wire_format() {
        let event = HeartRateWarningEvent {
            timestamp: 10,
            kind: WarningKind::High,
            value: 185,
            threshold: 180,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "high");
        assert_eq!(json["value"], 185);
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"defaultMode": "mixed", "soundEnabled": false}"#).unwrap();
        assert_eq!(settings.default_mode, GameMode::Mixed);
        assert!(!settings.sound_enabled);
        assert_eq!(settings.auto_end_timeout, 300);
        assert_eq!(settings.heart_rate_min, 60);
        assert_eq!(settings.heart_rate_max, 180);
        assert!(settings.vibrate_on_warning);
        assert!(!settings.sync_with_health);
        assert!(!settings.dark_mode);
    }

    #[test]
    fn test_settings_wire_names() {
        let settings: Settings =
            serde_json::from_str(r#"{"heartRateMax": 170, "vibrateOnWarning": false, "darkMode": true}"#).unwrap();
        assert_eq!(settings.heart_rate_max, 170);
        assert!(!settings.vibrate_on_warning);
        assert!(settings.dark_mode);

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["syncWithHealth"], false);
        assert_eq!(json["vibrateOnWarning"], false);
        assert_eq!(json["darkMode"], true);
    }
}
