//! # Session Recording Module
//!
//! Turns a stream of sensor updates into a finished `Session` record.
//!
//! ## Architecture
//! - **SessionRecorder**: Routes each update to the stroke detector or the
//!   heart-rate history and collects the derived series
//! - **Warnings**: A warning event is recorded when the heart rate enters a
//!   low or high band, not for every reading that stays in it
//! - **Replay**: `replay` drives a recorder from a timestamped capture with a
//!   manual clock, so recorded sessions reproduce exactly
//!
//! ## Data Flow
//! ```text
//! SensorUpdate ─┬─ accelerometer ─▶ StrokeDetector ──▶ speed series
//!               ├─ gyroscope ─────▶ StrokeDetector ──▶ DataPoint
//!               └─ heart rate ────▶ HeartRateHistory ▶ warnings
//! ```

use crate::calories::{calculate_calories, calculate_realtime_calories};
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::error::CaptureError;
use crate::heart_rate::{warning_event, HeartRateHistory, WarningLevel};
use crate::sensor::{SensorUpdate, TimedUpdate, Vector3};
use crate::session::{GameMode, HeartRateWarningEvent, Session};
use crate::stroke::{DataPoint, StrokeDetector, StrokeStats};
use crate::timeseries::TimeSeries;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

pub struct SessionRecorder {
    session: Session,
    detector: StrokeDetector,
    heart_rate: HeartRateHistory,
    speed_series: TimeSeries,
    warnings: Vec<HeartRateWarningEvent>,
    last_level: WarningLevel,
    heart_rate_min: u32,
    heart_rate_max: u32,
    weight_kg: f64,
    clock: Arc<dyn Clock>,
}

impl SessionRecorder {
    /// Start recording a session at the clock's current time
    pub fn new(mode: GameMode, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let mut detector = StrokeDetector::with_clock(config.stroke.clone(), clock.clone());
        detector.reset();

        Self {
            session: Session::new(mode, clock.now_ms()),
            detector,
            heart_rate: HeartRateHistory::new(),
            speed_series: TimeSeries::new(),
            warnings: Vec::new(),
            last_level: WarningLevel::Normal,
            heart_rate_min: config.heart_rate_min,
            heart_rate_max: config.heart_rate_max,
            weight_kg: config.body_weight_kg,
            clock,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.session.mode
    }

    pub fn stroke_stats(&self) -> StrokeStats {
        self.detector.stats()
    }

    pub fn warnings(&self) -> &[HeartRateWarningEvent] {
        &self.warnings
    }

    pub fn record_accelerometer(&mut self, sample: Vector3) {
        self.detector.process_accelerometer_sample(sample);
    }

    /// Returns the stroke this sample completed, if any
    pub fn record_gyroscope(&mut self, sample: Vector3) -> Option<DataPoint> {
        let point = self.detector.process_gyroscope_sample(sample)?;
        self.speed_series.add_point(point.timestamp(), point.speed() as f64);
        Some(point)
    }

    /// Returns the warning raised by this reading, if it entered a warning band
    pub fn record_heart_rate(&mut self, heart_rate: u32) -> Option<HeartRateWarningEvent> {
        let now = self.clock.now_ms();
        self.heart_rate.push(now, heart_rate);
        self.detector.note_heart_rate((heart_rate > 0).then_some(heart_rate));

        let check = self.heart_rate.check_warning(self.heart_rate_min, self.heart_rate_max);
        let entered = check.level != self.last_level;
        self.last_level = check.level;
        if !entered {
            return None;
        }

        let event = warning_event(&check, self.heart_rate_min, self.heart_rate_max, now)?;
        log::warn!("Heart rate {:?}: {} bpm", event.kind, event.value);
        self.warnings.push(event);
        Some(event)
    }

    pub fn apply(&mut self, update: SensorUpdate) -> Option<DataPoint> {
        match update {
            SensorUpdate::Accelerometer(sample) => {
                self.record_accelerometer(sample);
                None
            }
            SensorUpdate::Gyroscope(sample) => self.record_gyroscope(sample),
            SensorUpdate::HeartRate(sample) => {
                self.record_heart_rate(sample.heart_rate);
                None
            }
        }
    }

    /// Calories burned so far
    pub fn realtime_calories(&self) -> i64 {
        let elapsed_minutes = (self.clock.now_ms() - self.session.start_time).max(0) as f64 / 60_000.0;
        let avg = self.heart_rate.stats().avg as f64;
        calculate_realtime_calories(elapsed_minutes, self.session.mode.as_str(), avg, self.weight_kg)
    }

    /// Close the session at the clock's current time and fill in its statistics
    pub fn finish(self) -> Session {
        let mut session = self.session;
        session.finish(self.clock.now_ms());

        let strokes = self.detector.stats();
        session.strokes = strokes.stroke_count;
        session.smashes = strokes.smash_count;
        session.forehand = strokes.forehand_count;
        session.backhand = strokes.backhand_count;
        session.max_speed = strokes.max_speed as f64;

        let heart_rate = self.heart_rate.stats();
        session.avg_heart_rate = heart_rate.avg as f64;
        session.max_heart_rate = heart_rate.max as f64;
        session.min_heart_rate = heart_rate.min as f64;

        session.calories = calculate_calories(
            session.elapsed_minutes(),
            session.mode.intensity(),
            self.weight_kg,
            session.avg_heart_rate,
        ) as f64;

        if !self.heart_rate.is_empty() {
            session.heart_rate_series = Some(self.heart_rate.history(0));
        }
        if !self.speed_series.is_empty() {
            session.speed_series = Some(self.speed_series.points().to_vec());
        }
        if !self.warnings.is_empty() {
            session.heart_rate_warning_events = Some(self.warnings);
        }

        log::info!(
            "Session finished: {} strokes, {} s, {} kcal",
            session.strokes,
            session.duration,
            session.calories
        );
        session
    }
}

/// Record a whole capture. The session spans the first to the last update.
pub fn replay<I>(updates: I, mode: GameMode, config: &Config) -> Session
where
    I: IntoIterator<Item = TimedUpdate>,
{
    let mut updates = updates.into_iter().peekable();
    let start = updates.peek().map(|u| u.t).unwrap_or(0);

    let clock = ManualClock::new(start);
    let mut recorder = SessionRecorder::new(mode, config, Arc::new(clock.clone()));

    let mut count = 0usize;
    for timed in updates {
        clock.set(timed.t.max(clock.now_ms()));
        recorder.apply(timed.update);
        count += 1;
    }
    log::debug!("Replayed {} sensor updates", count);

    recorder.finish()
}

/// Read a JSON-lines capture of `TimedUpdate`s. Blank lines are skipped.
pub fn load_capture(path: &Path) -> Result<Vec<TimedUpdate>, CaptureError> {
    let file = File::open(path).map_err(CaptureError::ReadFailed)?;
    let mut updates = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(CaptureError::ReadFailed)?;
        if line.trim().is_empty() {
            continue;
        }
        let update = serde_json::from_str(&line).map_err(|source| CaptureError::ParseFailed {
            line: index + 1,
            source,
        })?;
        updates.push(update);
    }

    log::info!("Loaded {} updates from {}", updates.len(), path.display());
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::HeartRateSample;
    use crate::session::WarningKind;

    fn accel(t: i64, magnitude: f64) -> TimedUpdate {
        TimedUpdate {
            t,
            update: SensorUpdate::Accelerometer(Vector3::new(magnitude, 0.0, 0.0)),
        }
    }

    fn gyro(t: i64, magnitude: f64) -> TimedUpdate {
        TimedUpdate {
            t,
            update: SensorUpdate::Gyroscope(Vector3::new(0.0, magnitude, 0.0)),
        }
    }

    fn bpm(t: i64, heart_rate: u32) -> TimedUpdate {
        TimedUpdate {
            t,
            update: SensorUpdate::HeartRate(HeartRateSample { heart_rate }),
        }
    }

    #[test]
    fn test_replay_builds_session() {
        let capture = vec![
            bpm(0, 120),
            accel(1_000, 20.0),
            gyro(1_100, 3.0),
            gyro(1_200, 4.0),
            accel(2_000, 30.0),
            gyro(2_200, 6.0),
            bpm(30_000, 140),
            bpm(60_000, 130),
        ];

        let session = replay(capture, GameMode::Doubles, &Config::default());

        assert_eq!(session.start_time, 0);
        assert_eq!(session.end_time, Some(60_000));
        assert_eq!(session.duration, 60);
        assert_eq!(session.strokes, 2);
        assert_eq!(session.smashes, 1);
        assert!(session.is_consistent());
        assert_eq!(session.max_speed, 45.0);
        assert_eq!(session.avg_heart_rate, 130.0);
        assert_eq!((session.min_heart_rate, session.max_heart_rate), (120.0, 140.0));
        // general 7.0 × 1.0 × 70 kg × 1/60 h
        assert_eq!(session.calories, 8.0);

        let speeds: Vec<f64> = session.speed_series.unwrap().iter().map(|p| p.value).collect();
        assert_eq!(speeds, vec![30.0, 45.0]);
        assert_eq!(session.heart_rate_series.unwrap().len(), 3);
        assert_eq!(session.heart_rate_warning_events, None);
    }

    #[test]
    fn test_warning_recorded_once_per_excursion() {
        let capture = vec![bpm(0, 100), bpm(1, 190), bpm(2, 195), bpm(3, 150), bpm(4, 50), bpm(5, 200)];
        let session = replay(capture, GameMode::Singles, &Config::default());

        let kinds: Vec<WarningKind> = session
            .heart_rate_warning_events
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![WarningKind::High, WarningKind::Low, WarningKind::High]);
    }

    #[test]
    fn test_stroke_carries_latest_heart_rate() {
        let clock = ManualClock::new(0);
        let mut recorder = SessionRecorder::new(GameMode::Singles, &Config::default(), Arc::new(clock.clone()));

        recorder.record_heart_rate(128);
        recorder.record_accelerometer(Vector3::new(0.0, 0.0, 18.0));
        clock.advance(200);
        let point = recorder.record_gyroscope(Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(point.heart_rate(), Some(128));
        assert_eq!(recorder.stroke_stats().stroke_count, 1);
    }

    #[test]
    fn test_realtime_calories_follow_clock() {
        let clock = ManualClock::new(0);
        let recorder = SessionRecorder::new(GameMode::Singles, &Config::default(), Arc::new(clock.clone()));
        assert_eq!(recorder.realtime_calories(), 0);

        clock.advance(30 * 60_000);
        // competitive 9.0 × 70 kg × 0.5 h
        assert_eq!(recorder.realtime_calories(), 315);
    }

    #[test]
    fn test_load_capture_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");
        std::fs::write(
            &path,
            "{\"t\": 0, \"update\": {\"heart_rate\": {\"heartRate\": 90}}}\n\n\
             {\"t\": 5, \"update\": {\"accelerometer\": {\"x\": 1.0, \"y\": 2.0, \"z\": 2.0}}}\n",
        )
        .unwrap();

        let updates = load_capture(&path).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], bpm(0, 90));

        std::fs::write(&path, "{\"t\": 0}\nnot json\n").unwrap();
        assert!(matches!(load_capture(&path), Err(CaptureError::ParseFailed { line: 1, .. })));
        assert!(matches!(
            load_capture(&dir.path().join("missing.jsonl")),
            Err(CaptureError::ReadFailed(_))
        ));
    }

    #[test]
    fn test_empty_capture_is_empty_session() {
        let session = replay(Vec::new(), GameMode::Mixed, &Config::default());
        assert_eq!(session.duration, 0);
        assert_eq!(session.strokes, 0);
        assert_eq!(session.heart_rate_series, None);
        assert_eq!(session.calories, 0.0);
    }
}
