use serde::{Deserialize, Serialize};

/// One `{timestamp, value}` sample of a session time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone)]
pub struct TimeSeries {
    data: Vec<SeriesPoint>,
}

pub trait PointSliceExt {
    fn min_max_value(&self) -> Option<(f64, f64)>;
    fn mean_value(&self) -> Option<f64>;
}

impl PointSliceExt for [SeriesPoint] {
    fn min_max_value(&self) -> Option<(f64, f64)> {
        self.iter().fold(None, |acc, point| match acc {
            None => Some((point.value, point.value)),
            Some((min, max)) => Some((min.min(point.value), max.max(point.value))),
        })
    }

    fn mean_value(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().map(|p| p.value).sum::<f64>() / self.len() as f64)
    }
}

impl TimeSeries {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn add_point(&mut self, timestamp: i64, value: f64) {
        self.data.push(SeriesPoint { timestamp, value });
    }

    pub fn last_points(&self, n: usize) -> &[SeriesPoint] {
        &self.data[self.data.len().saturating_sub(n)..]
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_points_keeps_chronological_order() {
        let mut series = TimeSeries::new();
        for (t, v) in [(1, 70.0), (2, 90.0), (3, 80.0)] {
            series.add_point(t, v);
        }

        let tail: Vec<i64> = series.last_points(2).iter().map(|p| p.timestamp).collect();
        assert_eq!(tail, vec![2, 3]);
        assert_eq!(series.last_points(10).len(), 3);
    }

    #[test]
    fn test_slice_min_max_and_mean() {
        let points = [SeriesPoint::new(5, 70.0), SeriesPoint::new(1, 90.0), SeriesPoint::new(3, 80.0)];

        assert_eq!(points.min_max_value(), Some((70.0, 90.0)));
        assert_eq!(points.mean_value(), Some(80.0));

        let empty: [SeriesPoint; 0] = [];
        assert_eq!(empty.min_max_value(), None);
        assert_eq!(empty.mean_value(), None);
    }
}
