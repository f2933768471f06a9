//! # Heart Rate Monitor Module
//!
//! Tracks heart-rate readings for one session and evaluates them against the
//! user's warning thresholds.
//!
//! ## Key Types
//! - `HeartRateHistory`: Pure reading history with derived min / max / avg
//! - `HeartRateMonitor`: Subscription lifecycle around a shared history
//! - `WarningCheck`: Result of comparing the current reading to a range
//!
//! ## Threading
//! Readings are appended by the stream's listener thread. Every accessor on
//! the monitor returns a copy taken under the lock, so callers never observe
//! a half-updated history.

use crate::clock::{system_clock, Clock};
use crate::sensor::{HeartRateSample, SensorSource, SensorStream};
use crate::session::{HeartRateWarningEvent, WarningKind};
use crate::timeseries::{PointSliceExt, SeriesPoint, TimeSeries};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Snapshot of the session's heart-rate figures (bpm). All zero before the
/// first reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeartRateStats {
    pub current: u32,
    pub min: u32,
    pub max: u32,
    pub avg: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Normal,
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningCheck {
    #[serde(rename = "type")]
    pub level: WarningLevel,
    /// Absent when no reading has arrived yet
    pub value: Option<u32>,
}

impl WarningCheck {
    pub fn is_warning(&self) -> bool {
        self.level != WarningLevel::Normal
    }
}

/// Heart-rate readings of one session
#[derive(Debug, Default)]
pub struct HeartRateHistory {
    series: TimeSeries,
    stats: HeartRateStats,
}

impl HeartRateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.series.clear();
        self.stats = HeartRateStats::default();
    }

    /// Append a reading and recompute the derived figures over the full history
    pub fn push(&mut self, timestamp: i64, heart_rate: u32) {
        self.series.add_point(timestamp, heart_rate as f64);

        let points = self.series.points();
        let (min, max) = points.min_max_value().unwrap_or((0.0, 0.0));
        let avg = points.mean_value().unwrap_or(0.0);

        self.stats = HeartRateStats {
            current: heart_rate,
            min: min as u32,
            max: max as u32,
            avg: avg.round() as u32,
        };
    }

    pub fn stats(&self) -> HeartRateStats {
        self.stats
    }

    /// The most recent `limit` readings in chronological order. A limit of 0
    /// or one covering the whole history returns everything.
    pub fn history(&self, limit: usize) -> Vec<SeriesPoint> {
        if limit == 0 {
            return self.series.points().to_vec();
        }
        self.series.last_points(limit).to_vec()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn check_warning(&self, min: u32, max: u32) -> WarningCheck {
        let current = self.stats.current;
        if current == 0 {
            return WarningCheck {
                level: WarningLevel::Normal,
                value: None,
            };
        }

        let level = if current < min {
            WarningLevel::Low
        } else if current > max {
            WarningLevel::High
        } else {
            WarningLevel::Normal
        };

        WarningCheck {
            level,
            value: Some(current),
        }
    }
}

/// Heart-rate subscription for one session.
pub struct HeartRateMonitor {
    stream: SensorStream<HeartRateSample>,
    history: Arc<Mutex<HeartRateHistory>>,
    clock: Arc<dyn Clock>,
    interval_ms: u64,
}

impl HeartRateMonitor {
    pub fn new(source: Box<dyn SensorSource<HeartRateSample>>, interval_ms: u64) -> Self {
        Self::with_clock(source, interval_ms, system_clock())
    }

    pub fn with_clock(source: Box<dyn SensorSource<HeartRateSample>>, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            stream: SensorStream::new(source),
            history: Arc::new(Mutex::new(HeartRateHistory::new())),
            clock,
            interval_ms,
        }
    }

    /// Clear the history and start listening. `on_reading` receives every raw
    /// value after it has been recorded.
    pub fn start<F>(&mut self, mut on_reading: F) -> bool
    where
        F: FnMut(u32) + Send + 'static,
    {
        // An active stream would keep appending into the cleared history
        self.stream.stop();
        if let Ok(mut history) = self.history.lock() {
            history.reset();
        }

        let history = self.history.clone();
        let clock = self.clock.clone();
        self.stream.start(self.interval_ms, move |sample: HeartRateSample| {
            let now = clock.now_ms();
            match history.lock() {
                Ok(mut history) => history.push(now, sample.heart_rate),
                Err(_) => log::error!("Heart rate history lock poisoned, dropping reading"),
            }
            log::debug!("Heart rate: {} bpm", sample.heart_rate);
            on_reading(sample.heart_rate);
        })
    }

    /// Release the subscription. Safe to call when not started.
    pub fn stop(&mut self) -> bool {
        self.stream.stop()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_active()
    }

    pub fn stats(&self) -> HeartRateStats {
        self.history.lock().map(|h| h.stats()).unwrap_or_default()
    }

    pub fn history(&self, limit: usize) -> Vec<SeriesPoint> {
        self.history.lock().map(|h| h.history(limit)).unwrap_or_default()
    }

    pub fn check_warning(&self, min: u32, max: u32) -> WarningCheck {
        match self.history.lock() {
            Ok(history) => history.check_warning(min, max),
            Err(_) => WarningCheck {
                level: WarningLevel::Normal,
                value: None,
            },
        }
    }

    /// Warning record for the current reading, stamped with the monitor's clock
    pub fn warning_event(&self, min: u32, max: u32) -> Option<HeartRateWarningEvent> {
        warning_event(&self.check_warning(min, max), min, max, self.clock.now_ms())
    }
}

/// Build the persisted record for a failed check
pub fn warning_event(check: &WarningCheck, min: u32, max: u32, timestamp: i64) -> Option<HeartRateWarningEvent> {
    let value = check.value?;
    let (kind, threshold) = match check.level {
        WarningLevel::Normal => return None,
        WarningLevel::Low => (WarningKind::Low, min),
        WarningLevel::High => (WarningKind::High, max),
    };
    Some(HeartRateWarningEvent {
        timestamp,
        kind,
        value,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sensor::ChannelSource;

    fn history_of(values: &[u32]) -> HeartRateHistory {
        let mut history = HeartRateHistory::new();
        for (i, value) in values.iter().enumerate() {
            history.push(i as i64 * 1000, *value);
        }
        history
    }

    #[test]
    fn test_stats_over_history() {
        let history = history_of(&[70, 90, 80]);
        let stats = history.stats();
        assert_eq!(stats.min, 70);
        assert_eq!(stats.max, 90);
        assert_eq!(stats.avg, 80);
        assert_eq!(stats.current, 80);
    }

    #[test]
    fn test_average_is_rounded_mean() {
        let history = history_of(&[70, 71]);
        assert_eq!(history.stats().avg, 71);
        let history = history_of(&[70, 70, 71]);
        assert_eq!(history.stats().avg, 70);
    }

    #[test]
    fn test_check_warning_levels() {
        let history = history_of(&[75]);
        let check = history.check_warning(60, 160);
        assert!(!check.is_warning());
        assert_eq!(check.level, WarningLevel::Normal);
        assert_eq!(check.value, Some(75));

        let history = history_of(&[50]);
        let check = history.check_warning(60, 160);
        assert!(check.is_warning());
        assert_eq!(check.level, WarningLevel::Low);
        assert_eq!(check.value, Some(50));

        let history = history_of(&[170]);
        assert_eq!(history.check_warning(60, 160).level, WarningLevel::High);
    }

    #[test]
    fn test_check_warning_boundaries_are_normal() {
        assert_eq!(history_of(&[60]).check_warning(60, 160).level, WarningLevel::Normal);
        assert_eq!(history_of(&[160]).check_warning(60, 160).level, WarningLevel::Normal);
    }

    #[test]
    fn test_no_reading_is_normal_without_value() {
        let check = HeartRateHistory::new().check_warning(60, 160);
        assert!(!check.is_warning());
        assert_eq!(check.value, None);

        let check = history_of(&[0]).check_warning(60, 160);
        assert_eq!(check.value, None);
    }

    #[test]
    fn test_history_limit() {
        let history = history_of(&[60, 70, 80, 90]);
        let values: Vec<f64> = history.history(2).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![80.0, 90.0]);
        assert_eq!(history.history(0).len(), 4);
        assert_eq!(history.history(10).len(), 4);
    }

    #[test]
    fn test_warning_event_carries_threshold() {
        let check = history_of(&[190]).check_warning(60, 180);
        let event = warning_event(&check, 60, 180, 42).unwrap();
        assert_eq!(event.kind, WarningKind::High);
        assert_eq!(event.value, 190);
        assert_eq!(event.threshold, 180);
        assert_eq!(event.timestamp, 42);

        let normal = history_of(&[100]).check_warning(60, 180);
        assert!(warning_event(&normal, 60, 180, 42).is_none());
    }

    #[test]
    fn test_monitor_records_readings_until_stopped() {
        let (source, feed) = ChannelSource::<HeartRateSample>::new("heart rate");
        let clock = ManualClock::new(5_000);
        let mut monitor = HeartRateMonitor::with_clock(Box::new(source), 1000, Arc::new(clock.clone()));
        let (seen_tx, seen_rx) = crossbeam_channel::unbounded();

        assert!(monitor.stop(), "stop before start is a no-op");
        assert!(monitor.start(move |bpm| {
            let _ = seen_tx.send(bpm);
        }));

        for bpm in [70, 90, 80] {
            assert!(feed.push(HeartRateSample { heart_rate: bpm }));
        }
        assert!(monitor.stop());
        assert!(monitor.stop());
        assert!(!feed.push(HeartRateSample { heart_rate: 200 }));

        let stats = monitor.stats();
        assert_eq!((stats.min, stats.max, stats.avg), (70, 90, 80));
        assert_eq!(seen_rx.try_iter().collect::<Vec<_>>(), vec![70, 90, 80]);
        assert!(monitor.history(0).iter().all(|p| p.timestamp == 5_000));

        clock.advance(10);
        let event = monitor.warning_event(85, 180).unwrap();
        assert_eq!(event.kind, WarningKind::Low);
        assert_eq!(event.timestamp, 5_010);
    }

    #[test]
    fn test_restart_clears_history() {
        let (source, feed) = ChannelSource::<HeartRateSample>::new("heart rate");
        let mut monitor = HeartRateMonitor::new(Box::new(source), 1000);

        assert!(monitor.start(|_| {}));
        feed.push(HeartRateSample { heart_rate: 120 });
        assert!(monitor.stop());
        assert_eq!(monitor.history(0).len(), 1);

        assert!(monitor.start(|_| {}));
        assert!(monitor.history(0).is_empty());
        assert_eq!(monitor.stats(), HeartRateStats::default());
        assert!(monitor.stop());
    }
}
