//! # Sensor Ingress Module
//!
//! Signal primitives and the plumbing that moves raw samples from a platform
//! sensor subscription onto a worker thread.
//!
//! ## Key Types
//! - `Vector3`: One 3-axis accelerometer or gyroscope reading
//! - `SensorUpdate`: Sample envelope sent between threads (and stored in captures)
//! - `SensorSource`: Platform subscription seam (subscribe / unsubscribe)
//! - `ChannelSource` + `SampleFeed`: In-process source used by replays and tests
//! - `SensorStream`: Owns a source and the listener thread draining it
//!
//! ## Subscription Rules
//! A source has at most one active subscription; subscribing again closes the
//! previous stream. Unsubscribing is idempotent, and stopping a stream
//! processes every sample that was delivered before the stop.

use crate::error::SensorError;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;

/// 3-axis sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Heart-rate sample as delivered by the platform (`{ "heartRate": 72 }`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateSample {
    pub heart_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorUpdate {
    Accelerometer(Vector3),
    Gyroscope(Vector3),
    HeartRate(HeartRateSample),
}

/// Sensor update stamped with its arrival time, one line of a capture file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedUpdate {
    pub t: i64,
    pub update: SensorUpdate,
}

/// Platform subscription seam for one sensor.
pub trait SensorSource<T>: Send {
    /// Human readable sensor name used in logs and errors
    fn name(&self) -> &'static str;

    /// Open the stream. Replaces any subscription that is still active.
    fn subscribe(&mut self, interval_ms: u64) -> Result<Receiver<T>, SensorError>;

    /// Release the stream. Safe to call when nothing is subscribed.
    fn unsubscribe(&mut self) -> Result<(), SensorError>;
}

/// In-process sensor source.
///
/// Samples pushed through the paired `SampleFeed` reach whichever receiver was
/// handed out by the most recent `subscribe`. Pushes made while unsubscribed
/// are dropped, like readings a platform delivers to nobody.
pub struct ChannelSource<T> {
    name: &'static str,
    slot: Arc<Mutex<Option<Sender<T>>>>,
}

/// Producer side of a `ChannelSource`
#[derive(Clone)]
pub struct SampleFeed<T> {
    slot: Arc<Mutex<Option<Sender<T>>>>,
}

impl<T> ChannelSource<T> {
    pub fn new(name: &'static str) -> (Self, SampleFeed<T>) {
        let slot = Arc::new(Mutex::new(None));
        (
            Self {
                name,
                slot: slot.clone(),
            },
            SampleFeed { slot },
        )
    }
}

impl<T: Send> SensorSource<T> for ChannelSource<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn subscribe(&mut self, interval_ms: u64) -> Result<Receiver<T>, SensorError> {
        let (sender, receiver) = unbounded();
        let mut slot = self.slot.lock().map_err(|_| SensorError::SubscribeFailed {
            sensor: self.name,
            reason: "source lock poisoned".to_string(),
        })?;
        if slot.replace(sender).is_some() {
            log::debug!("{} source: replacing active subscription", self.name);
        }
        log::debug!("{} source: subscribed at {} ms interval", self.name, interval_ms);
        Ok(receiver)
    }

    fn unsubscribe(&mut self) -> Result<(), SensorError> {
        let mut slot = self.slot.lock().map_err(|_| SensorError::UnsubscribeFailed {
            sensor: self.name,
            reason: "source lock poisoned".to_string(),
        })?;
        slot.take();
        Ok(())
    }
}

impl<T> SampleFeed<T> {
    /// Deliver one sample. Returns false when no subscriber is listening.
    pub fn push(&self, sample: T) -> bool {
        match self.slot.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(sender) => sender.send(sample).is_ok(),
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

/// Worker thread draining one sample stream into a callback
struct Listener {
    stop_tx: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Listener {
    fn spawn<T, F>(name: &'static str, samples: Receiver<T>, mut on_sample: F) -> Result<Self, SensorError>
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name(format!("{}-listener", name))
            .spawn(move || {
                loop {
                    select! {
                        recv(samples) -> msg => match msg {
                            Ok(sample) => on_sample(sample),
                            Err(_) => {
                                log::debug!("{} listener: stream closed", name);
                                break;
                            }
                        },
                        recv(stop_rx) -> _ => {
                            // Samples already delivered still count
                            for sample in samples.try_iter() {
                                on_sample(sample);
                            }
                            log::debug!("{} listener: stopped", name);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SensorError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Stop the worker and wait for it. Returns false if the worker panicked.
    fn stop(&mut self) -> bool {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.worker.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A sensor source together with the listener thread consuming it.
pub struct SensorStream<T> {
    source: Box<dyn SensorSource<T>>,
    listener: Option<Listener>,
}

impl<T: Send + 'static> SensorStream<T> {
    pub fn new(source: Box<dyn SensorSource<T>>) -> Self {
        Self {
            source,
            listener: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    /// Subscribe and start delivering samples to `on_sample`.
    ///
    /// Any previous subscription is stopped first. Failures are logged and
    /// reported as `false`.
    pub fn start<F>(&mut self, interval_ms: u64, on_sample: F) -> bool
    where
        F: FnMut(T) + Send + 'static,
    {
        self.stop();

        let name = self.source.name();
        let samples = match self.source.subscribe(interval_ms) {
            Ok(receiver) => receiver,
            Err(e) => {
                log::error!("{}", e);
                return false;
            }
        };

        match Listener::spawn(name, samples, on_sample) {
            Ok(listener) => {
                log::info!("{} stream started", name);
                self.listener = Some(listener);
                true
            }
            Err(e) => {
                log::error!("{}", e);
                if let Err(e) = self.source.unsubscribe() {
                    log::error!("{}", e);
                }
                false
            }
        }
    }

    /// Release the subscription exactly once and join the listener.
    ///
    /// Returns true when already stopped.
    pub fn stop(&mut self) -> bool {
        let Some(mut listener) = self.listener.take() else {
            return true;
        };

        let name = self.source.name();
        let released = match self.source.unsubscribe() {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        };
        let joined = listener.stop();
        if !joined {
            log::error!("{} listener panicked", name);
        }
        log::info!("{} stream stopped", name);
        released && joined
    }
}

impl<T> Drop for SensorStream<T> {
    fn drop(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            let _ = self.source.unsubscribe();
            listener.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_magnitude_is_euclidean_norm() {
        assert_eq!(Vector3::new(3.0, 4.0, 0.0).magnitude(), 5.0);
        assert_eq!(Vector3::new(2.0, 3.0, 6.0).magnitude(), 7.0);
        assert_eq!(Vector3::default().magnitude(), 0.0);
    }

    #[test]
    fn test_heart_rate_sample_wire_format() {
        let sample: HeartRateSample = serde_json::from_str(r#"{"heartRate": 72}"#).unwrap();
        assert_eq!(sample.heart_rate, 72);
    }

    #[test]
    fn test_timed_update_parses_capture_line() {
        let line = r#"{"t": 120, "update": {"gyroscope": {"x": 0.5, "y": 0.0, "z": 1.0}}}"#;
        let timed: TimedUpdate = serde_json::from_str(line).unwrap();
        assert_eq!(timed.t, 120);
        assert_eq!(timed.update, SensorUpdate::Gyroscope(Vector3::new(0.5, 0.0, 1.0)));
    }

    #[test]
    fn test_feed_without_subscriber_drops_sample() {
        let (_source, feed) = ChannelSource::<Vector3>::new("accelerometer");
        assert!(!feed.is_subscribed());
        assert!(!feed.push(Vector3::default()));
    }

    #[test]
    fn test_resubscribe_closes_previous_receiver() {
        let (mut source, feed) = ChannelSource::<u32>::new("heart rate");
        let first = source.subscribe(20).unwrap();
        let second = source.subscribe(20).unwrap();

        assert!(feed.push(7));
        assert_eq!(second.recv_timeout(Duration::from_secs(1)), Ok(7));
        assert!(first.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_stream_delivers_samples_and_stops_idempotently() {
        let (source, feed) = ChannelSource::<Vector3>::new("gyroscope");
        let mut stream = SensorStream::new(Box::new(source));
        let (seen_tx, seen_rx) = unbounded();

        assert!(stream.stop(), "stop before start is a no-op");
        assert!(stream.start(20, move |v: Vector3| {
            let _ = seen_tx.send(v.magnitude());
        }));
        assert!(stream.is_active());

        feed.push(Vector3::new(3.0, 4.0, 0.0));
        feed.push(Vector3::new(0.0, 0.0, 2.0));

        assert!(stream.stop());
        assert!(!stream.is_active());
        assert!(!feed.is_subscribed());
        assert!(stream.stop());

        let seen: Vec<f64> = seen_rx.try_iter().collect();
        assert_eq!(seen, vec![5.0, 2.0]);
    }

    struct RefusingSource;

    impl SensorSource<Vector3> for RefusingSource {
        fn name(&self) -> &'static str {
            "accelerometer"
        }

        fn subscribe(&mut self, _interval_ms: u64) -> Result<Receiver<Vector3>, SensorError> {
            Err(SensorError::SubscribeFailed {
                sensor: "accelerometer",
                reason: "permission denied".to_string(),
            })
        }

        fn unsubscribe(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
    }

    #[test]
    fn test_subscription_failure_reports_false() {
        let mut stream = SensorStream::new(Box::new(RefusingSource));
        assert!(!stream.start(20, |_v: Vector3| {}));
        assert!(!stream.is_active());
    }
}
