//! Badminton session tracking: stroke detection from motion sensors, heart-rate
//! monitoring, calorie estimation and a versioned SQLite session store.

pub mod calories;
pub mod clock;
pub mod config;
pub mod error;
pub mod heart_rate;
pub mod recorder;
pub mod sensor;
pub mod session;
pub mod store;
pub mod stroke;
pub mod summary;
pub mod timeseries;
