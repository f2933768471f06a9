//! # Calorie Estimator Module
//!
//! MET based energy estimate:
//!
//! calories = METs(intensity) × factor(avg heart rate) × weight kg × hours
//!
//! The heart-rate factor is a step function and only applies when an average
//! heart rate is known (> 0).

use crate::session::GameMode;
use serde::{Deserialize, Serialize};

/// Body weight used when the user has not configured one
pub const DEFAULT_WEIGHT_KG: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Casual,
    #[default]
    General,
    Competitive,
}

impl Intensity {
    /// Case-insensitive lookup, unknown labels are `General`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "casual" => Intensity::Casual,
            "competitive" => Intensity::Competitive,
            _ => Intensity::General,
        }
    }

    /// Intensity for a game-mode label. Labels that name no mode are `General`.
    pub fn from_mode_label(label: &str) -> Self {
        label
            .parse::<GameMode>()
            .map(|mode| mode.intensity())
            .unwrap_or(Intensity::General)
    }

    pub fn mets(&self) -> f64 {
        match self {
            Intensity::Casual => 4.5,
            Intensity::General => 7.0,
            Intensity::Competitive => 9.0,
        }
    }
}

impl GameMode {
    pub fn intensity(&self) -> Intensity {
        match self {
            GameMode::Singles => Intensity::Competitive,
            GameMode::Doubles | GameMode::Mixed => Intensity::General,
        }
    }
}

/// MET multiplier for an average heart rate
pub fn heart_rate_factor(avg_heart_rate: f64) -> f64 {
    if avg_heart_rate <= 0.0 {
        return 1.0;
    }
    match avg_heart_rate {
        hr if hr < 100.0 => 0.85,
        hr if hr < 120.0 => 0.95,
        hr if hr < 140.0 => 1.0,
        hr if hr < 160.0 => 1.1,
        hr if hr < 180.0 => 1.2,
        _ => 1.3,
    }
}

/// Estimated kcal burned, rounded to the nearest integer
pub fn calculate_calories(duration_minutes: f64, intensity: Intensity, weight_kg: f64, avg_heart_rate: f64) -> i64 {
    let mets = intensity.mets() * heart_rate_factor(avg_heart_rate);
    (mets * weight_kg * (duration_minutes / 60.0)).round() as i64
}

/// Running estimate for a session in progress. `mode` is a game-mode label;
/// labels that name no mode are scored as general play.
pub fn calculate_realtime_calories(elapsed_minutes: f64, mode: &str, avg_heart_rate: f64, weight_kg: f64) -> i64 {
    calculate_calories(elapsed_minutes, Intensity::from_mode_label(mode), weight_kg, avg_heart_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_hour_without_heart_rate() {
        assert_eq!(calculate_calories(60.0, Intensity::General, 70.0, 0.0), 490);
    }

    #[test]
    fn test_neutral_band_leaves_estimate_unchanged() {
        assert_eq!(calculate_calories(60.0, Intensity::General, 70.0, 130.0), 490);
    }

    #[test]
    fn test_heart_rate_bands() {
        assert_eq!(heart_rate_factor(99.0), 0.85);
        assert_eq!(heart_rate_factor(100.0), 0.95);
        assert_eq!(heart_rate_factor(139.0), 1.0);
        assert_eq!(heart_rate_factor(140.0), 1.1);
        assert_eq!(heart_rate_factor(179.0), 1.2);
        assert_eq!(heart_rate_factor(180.0), 1.3);
        assert_eq!(heart_rate_factor(-5.0), 1.0);
    }

    #[test]
    fn test_intensity_labels() {
        assert_eq!(Intensity::from_label("COMPETITIVE"), Intensity::Competitive);
        assert_eq!(Intensity::from_label("Casual"), Intensity::Casual);
        assert_eq!(Intensity::from_label("extreme"), Intensity::General);
    }

    #[test]
    fn test_mode_mapping() {
        assert_eq!(GameMode::Singles.intensity(), Intensity::Competitive);
        assert_eq!(GameMode::Doubles.intensity(), Intensity::General);
        assert_eq!(GameMode::Mixed.intensity(), Intensity::General);
    }

    #[test]
    fn test_mode_labels_map_to_intensity() {
        assert_eq!(Intensity::from_mode_label("Singles"), Intensity::Competitive);
        assert_eq!(Intensity::from_mode_label(" mixed "), Intensity::General);
        assert_eq!(Intensity::from_mode_label("tennis"), Intensity::General);
        assert_eq!(Intensity::from_mode_label(""), Intensity::General);
        assert_eq!(calculate_calories(60.0, Intensity::from_mode_label("tennis"), 70.0, 0.0), 490);
    }

    #[test]
    fn test_realtime_estimate_uses_mode() {
        // 9.0 × 1.2 × 70 × 0.5
        assert_eq!(calculate_realtime_calories(30.0, "singles", 165.0, DEFAULT_WEIGHT_KG), 378);
        assert_eq!(calculate_realtime_calories(0.0, "doubles", 0.0, DEFAULT_WEIGHT_KG), 0);
        // 7.0 × 1.2 × 70 × 0.5
        assert_eq!(calculate_realtime_calories(30.0, "tennis", 165.0, DEFAULT_WEIGHT_KG), 294);
    }
}
