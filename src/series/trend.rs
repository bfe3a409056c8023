//! Numeric trend scores over an indicator's dated readings.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const FLAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Stable => "stable",
        })
    }
}

/// Trend of a numeric series in date order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub direction: TrendDirection,
    pub points: usize,
    pub first: f64,
    pub latest: f64,
    /// Latest reading minus the one before it.
    pub delta: f64,
    pub z_score: f64,
}

/// z-score of the latest value against all earlier ones; 0 with fewer than
/// three readings or no spread.
pub fn rolling_z(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let (latest, earlier) = match values.split_last() {
        Some(parts) => parts,
        None => return 0.0,
    };
    let mean = earlier.iter().sum::<f64>() / earlier.len() as f64;
    let variance = earlier
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / earlier.len() as f64;
    if variance <= FLAT_EPSILON {
        return 0.0;
    }
    (latest - mean) / variance.sqrt()
}

/// Summarize dated readings; `None` below two points.
pub fn summarize(points: &[(NaiveDate, f64)]) -> Option<TrendSummary> {
    if points.len() < 2 {
        return None;
    }
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|(date, _)| *date);
    let values: Vec<f64> = sorted.iter().map(|(_, value)| *value).collect();

    let first = values[0];
    let latest = values[values.len() - 1];
    let delta = latest - values[values.len() - 2];
    let direction = if delta > FLAT_EPSILON {
        TrendDirection::Rising
    } else if delta < -FLAT_EPSILON {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    };

    Some(TrendSummary {
        direction,
        points: values.len(),
        first,
        latest,
        delta,
        z_score: rolling_z(&values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn falling_series_in_date_order() {
        let summary = summarize(&[(day(15), 3.8), (day(1), 4.2)]).unwrap();
        assert_eq!(summary.direction, TrendDirection::Falling);
        assert!((summary.delta + 0.4).abs() < 1e-9);
        assert_eq!(summary.first, 4.2);
        assert_eq!(summary.z_score, 0.0);
    }

    #[test]
    fn z_score_flags_outlier() {
        let z = rolling_z(&[4.0, 4.2, 4.1, 6.0]);
        assert!(z > 3.0);
        assert_eq!(rolling_z(&[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn single_point_has_no_trend() {
        assert!(summarize(&[(day(1), 1.0)]).is_none());
    }
}
