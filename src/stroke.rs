//! # Stroke Detection Module
//!
//! Two-phase state machine turning accelerometer and gyroscope samples into
//! classified strokes.
//!
//! ## Phases
//! - `Idle`: waiting for an acceleration spike above the swing floor, outside
//!   the cool-down window of the previous stroke
//! - `Detecting`: tracking peak acceleration and peak angular rate until a
//!   gyroscope sample arrives at least `min_stroke_duration_ms` after the spike
//!
//! ## Classification
//! - speed = round(peak acceleration × `speed_scale`)
//! - smash when peak acceleration exceeds `smash_acceleration_threshold`
//! - forehand when the peak angular rate is positive, backhand otherwise. This
//!   is a polarity heuristic with no orientation model behind it.
//!
//! ## Live Input
//! `MotionMonitor` subscribes to the accelerometer and the gyroscope at the
//! configured sampling interval and feeds both streams into one shared
//! detector.
//!
//! ## Known Limitation
//! A phase only closes when a gyroscope sample arrives. With acceleration data
//! alone the detector stays in `Detecting` and never records a stroke.

use crate::clock::{system_clock, Clock};
use crate::config::Config;
use crate::sensor::{SensorSource, SensorStream, Vector3};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Detection thresholds and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeConfig {
    /// Swing floor in m/s²
    pub acceleration_threshold: f64,
    /// Smash floor in m/s², above the swing floor
    pub smash_acceleration_threshold: f64,
    /// Angular rate of interest in rad/s. Tracked, never used as a gate.
    pub gyroscope_threshold: f64,
    /// Time a phase must span before a gyroscope sample can close it
    pub min_stroke_duration_ms: i64,
    /// Cool-down after a completed stroke
    pub min_stroke_interval_ms: i64,
    /// Peak acceleration to speed multiplier
    pub speed_scale: f64,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            acceleration_threshold: 15.0,
            smash_acceleration_threshold: 25.0,
            gyroscope_threshold: 5.0,
            min_stroke_duration_ms: 150,
            min_stroke_interval_ms: 500,
            speed_scale: 1.5,
        }
    }
}

/// Current detector phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorPhase {
    Idle,
    Detecting {
        started_at: i64,
        max_acceleration: f64,
        max_gyroscope: f64,
    },
}

/// Running counters for one session
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStats {
    pub stroke_count: u32,
    pub smash_count: u32,
    pub forehand_count: u32,
    pub backhand_count: u32,
    pub current_speed: u32,
    pub max_speed: u32,
}

/// One classified stroke. Never mutated after emission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    timestamp: i64,
    heart_rate: Option<u32>,
    speed: u32,
    is_smash: bool,
    is_forehand: bool,
}

impl DataPoint {
    pub fn new(timestamp: i64, heart_rate: Option<u32>, speed: u32, is_smash: bool, is_forehand: bool) -> Self {
        Self {
            timestamp,
            heart_rate,
            speed,
            is_smash,
            is_forehand,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn heart_rate(&self) -> Option<u32> {
        self.heart_rate
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn is_smash(&self) -> bool {
        self.is_smash
    }

    pub fn is_forehand(&self) -> bool {
        self.is_forehand
    }
}

/// Stroke detector for one session.
///
/// Owned by the sensor callback path; readers only get copies of its state.
pub struct StrokeDetector {
    config: StrokeConfig,
    clock: Arc<dyn Clock>,
    phase: DetectorPhase,
    last_stroke_at: Option<i64>,
    stats: StrokeStats,
    heart_rate: Option<u32>,
    subscriber: Option<Sender<DataPoint>>,
}

impl StrokeDetector {
    pub fn new(config: StrokeConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: StrokeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            phase: DetectorPhase::Idle,
            last_stroke_at: None,
            stats: StrokeStats::default(),
            heart_rate: None,
            subscriber: None,
        }
    }

    /// Reset for a new session and open the stroke event stream.
    pub fn init(&mut self) -> Receiver<DataPoint> {
        self.reset();
        self.subscribe()
    }

    /// Open a stroke event stream, closing any previous one.
    pub fn subscribe(&mut self) -> Receiver<DataPoint> {
        let (sender, receiver) = unbounded();
        self.subscriber = Some(sender);
        receiver
    }

    /// Clear counters and phase state
    pub fn reset(&mut self) {
        self.phase = DetectorPhase::Idle;
        self.last_stroke_at = None;
        self.stats = StrokeStats::default();
    }

    /// Latest heart rate, copied into emitted data points
    pub fn note_heart_rate(&mut self, heart_rate: Option<u32>) {
        self.heart_rate = heart_rate;
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn stats(&self) -> StrokeStats {
        self.stats
    }

    pub fn process_accelerometer_sample(&mut self, sample: Vector3) {
        let magnitude = sample.magnitude();
        let now = self.clock.now_ms();

        if let DetectorPhase::Detecting { max_acceleration, .. } = &mut self.phase {
            if magnitude > *max_acceleration {
                *max_acceleration = magnitude;
            }
            return;
        }

        let cooled_down = self
            .last_stroke_at
            .map_or(true, |last| now - last > self.config.min_stroke_interval_ms);

        if magnitude > self.config.acceleration_threshold && cooled_down {
            log::debug!("Stroke phase opened at {} ({:.2} m/s²)", now, magnitude);
            self.phase = DetectorPhase::Detecting {
                started_at: now,
                max_acceleration: magnitude,
                max_gyroscope: 0.0,
            };
        }
    }

    /// Track angular rate and close the phase once it has lasted long enough.
    ///
    /// Returns the emitted data point when this sample completed a stroke.
    pub fn process_gyroscope_sample(&mut self, sample: Vector3) -> Option<DataPoint> {
        let DetectorPhase::Detecting {
            started_at,
            max_acceleration,
            max_gyroscope,
        } = &mut self.phase
        else {
            return None;
        };

        let magnitude = sample.magnitude();
        if magnitude > *max_gyroscope {
            *max_gyroscope = magnitude;
        }

        let now = self.clock.now_ms();
        if now - *started_at < self.config.min_stroke_duration_ms {
            return None;
        }

        let (peak_acceleration, peak_gyroscope) = (*max_acceleration, *max_gyroscope);
        Some(self.complete_stroke(now, peak_acceleration, peak_gyroscope))
    }

    fn complete_stroke(&mut self, now: i64, peak_acceleration: f64, peak_gyroscope: f64) -> DataPoint {
        self.phase = DetectorPhase::Idle;
        self.last_stroke_at = Some(now);

        let speed = (peak_acceleration * self.config.speed_scale).round().max(0.0) as u32;
        let is_smash = peak_acceleration > self.config.smash_acceleration_threshold;
        let is_forehand = peak_gyroscope > 0.0;

        self.stats.current_speed = speed;
        if speed > self.stats.max_speed {
            self.stats.max_speed = speed;
        }
        self.stats.stroke_count += 1;
        if is_smash {
            self.stats.smash_count += 1;
        }
        if is_forehand {
            self.stats.forehand_count += 1;
        } else {
            self.stats.backhand_count += 1;
        }

        if peak_gyroscope > self.config.gyroscope_threshold {
            log::debug!("Stroke peak angular rate {:.2} rad/s above threshold", peak_gyroscope);
        }

        let point = DataPoint::new(now, self.heart_rate, speed, is_smash, is_forehand);
        log::debug!(
            "Stroke #{}: speed={} smash={} forehand={}",
            self.stats.stroke_count,
            speed,
            is_smash,
            is_forehand
        );

        if let Some(subscriber) = &self.subscriber {
            if subscriber.send(point).is_err() {
                log::debug!("Stroke subscriber dropped, closing stream");
                self.subscriber = None;
            }
        }

        point
    }
}

/// Motion sensor subscriptions for one session.
pub struct MotionMonitor {
    accelerometer: SensorStream<Vector3>,
    gyroscope: SensorStream<Vector3>,
    detector: Arc<Mutex<StrokeDetector>>,
    interval_ms: u64,
}

impl MotionMonitor {
    pub fn new(
        accelerometer: Box<dyn SensorSource<Vector3>>,
        gyroscope: Box<dyn SensorSource<Vector3>>,
        detector: StrokeDetector,
        interval_ms: u64,
    ) -> Self {
        Self {
            accelerometer: SensorStream::new(accelerometer),
            gyroscope: SensorStream::new(gyroscope),
            detector: Arc::new(Mutex::new(detector)),
            interval_ms,
        }
    }

    /// Detector thresholds and sampling interval taken from the config
    pub fn from_config(
        accelerometer: Box<dyn SensorSource<Vector3>>,
        gyroscope: Box<dyn SensorSource<Vector3>>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            accelerometer,
            gyroscope,
            StrokeDetector::with_clock(config.stroke.clone(), clock),
            config.sample_interval_ms,
        )
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Reset the detector and start both sensors.
    ///
    /// Returns the stroke event stream, or `None` when either subscription
    /// failed. Nothing is left running after a failure.
    pub fn start(&mut self) -> Option<Receiver<DataPoint>> {
        self.stop();

        let strokes = match self.detector.lock() {
            Ok(mut detector) => detector.init(),
            Err(_) => {
                log::error!("Stroke detector lock poisoned, not starting motion sensors");
                return None;
            }
        };

        let detector = self.detector.clone();
        let accelerometer_started = self.accelerometer.start(self.interval_ms, move |sample: Vector3| {
            if let Ok(mut detector) = detector.lock() {
                detector.process_accelerometer_sample(sample);
            }
        });

        let detector = self.detector.clone();
        let started = accelerometer_started
            && self.gyroscope.start(self.interval_ms, move |sample: Vector3| {
                if let Ok(mut detector) = detector.lock() {
                    detector.process_gyroscope_sample(sample);
                }
            });

        if !started {
            self.stop();
            return None;
        }
        Some(strokes)
    }

    /// Release both subscriptions. Safe to call when not started.
    pub fn stop(&mut self) -> bool {
        let accelerometer = self.accelerometer.stop();
        let gyroscope = self.gyroscope.stop();
        accelerometer && gyroscope
    }

    pub fn is_active(&self) -> bool {
        self.accelerometer.is_active() || self.gyroscope.is_active()
    }

    pub fn note_heart_rate(&self, heart_rate: Option<u32>) {
        if let Ok(mut detector) = self.detector.lock() {
            detector.note_heart_rate(heart_rate);
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.detector.lock().map(|d| d.phase()).unwrap_or(DetectorPhase::Idle)
    }

    pub fn stats(&self) -> StrokeStats {
        self.detector.lock().map(|d| d.stats()).unwrap_or_default()
    }
}
