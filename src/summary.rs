//! # Session Summary Module
//!
//! Presentation-neutral ratios and labels derived from a finished session.

use crate::session::Session;
use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::fmt;

/// Smash share of all strokes (offense) and the remainder (defense), in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OffenseDefense {
    pub offense: u32,
    pub defense: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandSplit {
    pub forehand_percent: u32,
    pub backhand_percent: u32,
}

fn rounded_percent(part: u32, total: u32) -> u32 {
    (part as f64 / total as f64 * 100.0).round() as u32
}

pub fn offense_defense(smashes: u32, strokes: u32) -> OffenseDefense {
    if strokes == 0 {
        return OffenseDefense::default();
    }
    let offense = rounded_percent(smashes.min(strokes), strokes);
    OffenseDefense {
        offense,
        defense: 100 - offense,
    }
}

pub fn hand_split(forehand: u32, backhand: u32) -> HandSplit {
    let total = forehand + backhand;
    if total == 0 {
        return HandSplit::default();
    }
    let forehand_percent = rounded_percent(forehand, total);
    HandSplit {
        forehand_percent,
        backhand_percent: 100 - forehand_percent,
    }
}

pub fn format_percentage(value: f64, total: f64) -> String {
    if total == 0.0 {
        return "0%".to_string();
    }
    format!("{}%", (value / total * 100.0).round())
}

/// `HH:MM:SS`. Negative durations render as zero.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

pub fn format_speed(speed: f64) -> String {
    format!("{} km/h", speed.round())
}

pub fn format_heart_rate(heart_rate: f64) -> String {
    format!("{} BPM", heart_rate.round())
}

pub fn format_calories(calories: f64) -> String {
    format!("{} kcal", calories.round())
}

/// UTC `YYYY-MM-DD HH:MM` for a millisecond timestamp
pub fn format_date(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(date) => date.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Human readable report of one session
pub struct SessionSummary<'a> {
    session: &'a Session,
}

impl<'a> SessionSummary<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn offense_defense(&self) -> OffenseDefense {
        offense_defense(self.session.smashes, self.session.strokes)
    }

    pub fn hand_split(&self) -> HandSplit {
        hand_split(self.session.forehand, self.session.backhand)
    }
}

impl fmt::Display for SessionSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.session;
        let od = self.offense_defense();
        let hands = self.hand_split();

        writeln!(f, "{} session on {}", s.mode, format_date(s.start_time))?;
        writeln!(f, "  duration   {}", format_duration(s.duration))?;
        writeln!(f, "  calories   {}", format_calories(s.calories))?;
        writeln!(
            f,
            "  strokes    {} ({} smashes, offense {}% / defense {}%)",
            s.strokes, s.smashes, od.offense, od.defense
        )?;
        writeln!(
            f,
            "  hands      forehand {}% / backhand {}%",
            hands.forehand_percent, hands.backhand_percent
        )?;
        writeln!(f, "  max speed  {}", format_speed(s.max_speed))?;
        write!(
            f,
            "  heart rate avg {} / min {} / max {}",
            format_heart_rate(s.avg_heart_rate),
            format_heart_rate(s.min_heart_rate),
            format_heart_rate(s.max_heart_rate)
        )?;
        if let Some(events) = &s.heart_rate_warning_events {
            if !events.is_empty() {
                write!(f, "\n  warnings   {}", events.len())?;
            }
        }
        Ok(())
    }
}
