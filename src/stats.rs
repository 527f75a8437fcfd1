//! Ambulatory Glucose Profile statistics
//!
//! Pure functions over a snapshot of readings: mean, GMI, variability,
//! time in the five clinical bands and the hour-of-day percentile profile.
//! Percentiles are rank-based (no interpolation) so reports stay comparable
//! with previously generated ones.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GlucoTrackError;
use crate::reading::Reading;
use crate::units::GlucoseRange;

/// Reports are refused below this many readings
pub const MIN_REPORT_READINGS: usize = 10;

/// GMI (%) = 3.31 + 0.02392 * mean glucose (mg/dL)
const GMI_INTERCEPT: f64 = 3.31;
const GMI_SLOPE: f64 = 0.02392;

/// CV at or above this is considered unstable
const STABLE_CV_PCT: f64 = 36.0;

/// Time-in-range counts over the five clinical bands
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeInRange {
    pub total: usize,
    pub very_low: usize,
    pub low: usize,
    pub in_range: usize,
    pub high: usize,
    pub very_high: usize,
}

impl TimeInRange {
    pub fn from_values(values: &[f64]) -> Self {
        let mut tir = Self { total: values.len(), ..Self::default() };

        for &v in values {
            match GlucoseRange::classify(v) {
                GlucoseRange::VeryLow => tir.very_low += 1,
                GlucoseRange::Low => tir.low += 1,
                GlucoseRange::InRange => tir.in_range += 1,
                GlucoseRange::High => tir.high += 1,
                GlucoseRange::VeryHigh => tir.very_high += 1,
            }
        }

        tir
    }

    /// Get percentage for a given range
    pub fn percentage(&self, range: GlucoseRange) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count = match range {
            GlucoseRange::VeryLow => self.very_low,
            GlucoseRange::Low => self.low,
            GlucoseRange::InRange => self.in_range,
            GlucoseRange::High => self.high,
            GlucoseRange::VeryHigh => self.very_high,
        };
        (count as f64 / self.total as f64) * 100.0
    }
}

/// Median and interquartile band for one hour of the day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPercentiles {
    pub hour: u8,
    pub count: usize,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
}

/// Overall glycemic control label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlLabel {
    Excellent,
    Good,
    NeedsImprovement,
}

impl ControlLabel {
    /// First matching tier wins
    pub fn classify(average: f64, cv: f64) -> Self {
        if average < 100.0 && cv < STABLE_CV_PCT {
            ControlLabel::Excellent
        } else if average < 154.0 && cv < STABLE_CV_PCT {
            ControlLabel::Good
        } else {
            ControlLabel::NeedsImprovement
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlLabel::Excellent => "Excellent",
            ControlLabel::Good => "Good",
            ControlLabel::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for ControlLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Report payload. Percentages are in `[0, 100]` and left unrounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgpSummary {
    pub reading_count: usize,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub average: f64,
    pub gmi: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub time_in_range_pct: f64,
    pub time_high_pct: f64,
    pub time_low_pct: f64,
    pub time_very_high_pct: f64,
    pub time_very_low_pct: f64,
    pub control: ControlLabel,
    pub hourly_profile: Vec<HourlyPercentiles>,
}

/// Summarize using the local calendar hour
pub fn summarize(history: &[Reading]) -> Result<AgpSummary, GlucoTrackError> {
    summarize_in(history, &Local)
}

/// Summarize with hours of day taken in `tz`
pub fn summarize_in<Tz: TimeZone>(history: &[Reading], tz: &Tz) -> Result<AgpSummary, GlucoTrackError> {
    if history.is_empty() {
        return Err(GlucoTrackError::InsufficientData);
    }

    let values: Vec<f64> = history.iter().map(|r| r.value).collect();
    let average = mean(&values);
    if average == 0.0 {
        return Err(GlucoTrackError::InvalidInput("mean glucose is zero".to_string()));
    }
    let std_dev = calculate_std_dev(&values, average);
    let cv = std_dev / average * 100.0;
    let tir = TimeInRange::from_values(&values);

    // history is non-empty, so min/max exist
    let period_start = history.iter().map(|r| r.timestamp).min().unwrap_or_default();
    let period_end = history.iter().map(|r| r.timestamp).max().unwrap_or_default();

    Ok(AgpSummary {
        reading_count: history.len(),
        period_start,
        period_end,
        average,
        gmi: GMI_INTERCEPT + GMI_SLOPE * average,
        std_dev,
        cv,
        time_in_range_pct: tir.percentage(GlucoseRange::InRange),
        time_high_pct: tir.percentage(GlucoseRange::High),
        time_low_pct: tir.percentage(GlucoseRange::Low),
        time_very_high_pct: tir.percentage(GlucoseRange::VeryHigh),
        time_very_low_pct: tir.percentage(GlucoseRange::VeryLow),
        control: ControlLabel::classify(average, cv),
        hourly_profile: hourly_profile_in(history, tz),
    })
}

/// Summarize for a report, enforcing the minimum sample size
pub fn report_summary(history: &[Reading]) -> Result<AgpSummary, GlucoTrackError> {
    if history.len() < MIN_REPORT_READINGS {
        return Err(GlucoTrackError::NotEnoughData { have: history.len(), need: MIN_REPORT_READINGS });
    }
    summarize(history)
}

/// Hour-of-day buckets ignoring the date; empty hours are omitted
pub fn hourly_profile_in<Tz: TimeZone>(history: &[Reading], tz: &Tz) -> Vec<HourlyPercentiles> {
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); 24];
    for reading in history {
        let hour = reading.timestamp.with_timezone(tz).hour() as usize;
        buckets[hour].push(reading.value);
    }

    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, values)| !values.is_empty())
        .map(|(hour, mut values)| {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let (median, p25, p75) = rank_percentiles(&values);
            HourlyPercentiles { hour: hour as u8, count: values.len(), median, p25, p75 }
        })
        .collect()
}

// ============= Helper Functions =============

/// Rank-based median, p25 and p75 of ascending values.
/// Out-of-range quartile indices fall back to the median.
fn rank_percentiles(sorted_values: &[f64]) -> (f64, f64, f64) {
    let n = sorted_values.len();
    if n == 0 {
        return (0.0, 0.0, 0.0);
    }
    let median = sorted_values[n / 2];
    let p25 = sorted_values.get(n / 4).copied().unwrap_or(median);
    let p75 = sorted_values.get(n * 3 / 4).copied().unwrap_or(median);
    (median, p25, p75)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1), zero below two values
fn calculate_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance: f64 = values.iter()
        .map(|&v| (v - mean).powi(2))
        .sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn readings_at_hour(hour: u32, values: &[f64]) -> Vec<Reading> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Reading::new(base + Duration::minutes(i as i64 * 5), v))
            .collect()
    }

    fn bucket_sum(s: &AgpSummary) -> f64 {
        s.time_very_low_pct + s.time_low_pct + s.time_in_range_pct + s.time_high_pct + s.time_very_high_pct
    }

    #[test]
    fn test_summary_of_ten_readings() {
        let history = readings_at_hour(8, &[60.0, 70.0, 75.0, 80.0, 90.0, 100.0, 120.0, 150.0, 180.0, 200.0]);
        let summary = summarize_in(&history, &Utc).unwrap();

        assert_eq!(summary.reading_count, 10);
        assert!((summary.average - 112.5).abs() < 1e-9);
        assert!((summary.gmi - (3.31 + 0.02392 * 112.5)).abs() < 1e-9);
        // 70 and 180 are in range
        assert!((summary.time_in_range_pct - 80.0).abs() < 1e-9);
        assert!((summary.time_low_pct - 10.0).abs() < 1e-9);
        assert!((summary.time_high_pct - 10.0).abs() < 1e-9);
        assert_eq!(summary.time_very_low_pct, 0.0);
        assert_eq!(summary.time_very_high_pct, 0.0);
        assert!((bucket_sum(&summary) - 100.0).abs() < 1e-9);

        assert_eq!(summary.hourly_profile.len(), 1);
        assert_eq!(summary.hourly_profile[0].hour, 8);
    }

    #[test]
    fn test_sample_std_dev_and_cv() {
        let history = readings_at_hour(0, &[100.0, 120.0, 140.0, 160.0, 180.0]);
        let summary = summarize_in(&history, &Utc).unwrap();
        // sum of squares 4000 over n - 1 = 4
        assert!((summary.std_dev - 1000.0_f64.sqrt()).abs() < 1e-9);
        assert!((summary.cv - 1000.0_f64.sqrt() / 140.0 * 100.0).abs() < 1e-9);

        let single = readings_at_hour(0, &[100.0]);
        let summary = summarize_in(&single, &Utc).unwrap();
        assert_eq!(summary.std_dev, 0.0);
        assert_eq!(summary.cv, 0.0);
    }

    #[test]
    fn test_empty_history_is_an_error() {
        assert!(matches!(summarize(&[]), Err(GlucoTrackError::InsufficientData)));
    }

    #[test]
    fn test_zero_mean_is_invalid() {
        let history = readings_at_hour(3, &[0.0, 0.0]);
        assert!(matches!(summarize_in(&history, &Utc), Err(GlucoTrackError::InvalidInput(_))));
    }

    #[test]
    fn test_report_requires_ten_readings() {
        let history = readings_at_hour(3, &[100.0; 9]);
        match report_summary(&history) {
            Err(GlucoTrackError::NotEnoughData { have, need }) => {
                assert_eq!(have, 9);
                assert_eq!(need, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
        let history = readings_at_hour(3, &[100.0; 10]);
        assert!(report_summary(&history).is_ok());
    }

    #[test]
    fn test_band_boundaries() {
        let history = readings_at_hour(12, &[70.0, 180.0, 250.0, 54.0]);
        let summary = summarize_in(&history, &Utc).unwrap();
        assert!((summary.time_in_range_pct - 50.0).abs() < 1e-9);
        assert!((summary.time_high_pct - 25.0).abs() < 1e-9);
        assert!((summary.time_low_pct - 25.0).abs() < 1e-9);
        assert_eq!(summary.time_very_high_pct, 0.0);
        assert_eq!(summary.time_very_low_pct, 0.0);
    }

    #[test]
    fn test_buckets_partition_everything() {
        let values: Vec<f64> = (0..97).map(|i| 45.0 + i as f64 * 3.6).collect();
        let history = readings_at_hour(5, &values);
        let summary = summarize_in(&history, &Utc).unwrap();
        assert!((bucket_sum(&summary) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_hour_bucket_percentiles() {
        let history = readings_at_hour(14, &[50.0, 10.0, 40.0, 20.0, 30.0]);
        let profile = hourly_profile_in(&history, &Utc);
        assert_eq!(profile, vec![HourlyPercentiles { hour: 14, count: 5, median: 30.0, p25: 20.0, p75: 40.0 }]);
    }

    #[test]
    fn test_small_buckets() {
        assert_eq!(rank_percentiles(&[90.0]), (90.0, 90.0, 90.0));
        // n = 2: median v[1], p25 v[0], p75 v[1]
        assert_eq!(rank_percentiles(&[80.0, 120.0]), (120.0, 80.0, 120.0));
    }

    #[test]
    fn test_hours_ignore_date_and_skip_empty() {
        let mut history = readings_at_hour(6, &[100.0, 110.0]);
        let next_day = Utc.with_ymd_and_hms(2024, 1, 16, 6, 30, 0).unwrap();
        history.push(Reading::new(next_day, 120.0));
        history.extend(readings_at_hour(22, &[150.0]));

        let profile = hourly_profile_in(&history, &Utc);
        let hours: Vec<u8> = profile.iter().map(|h| h.hour).collect();
        assert_eq!(hours, vec![6, 22]);
        assert_eq!(profile[0].count, 3);
        assert_eq!(profile[0].median, 110.0);
    }

    #[test]
    fn test_hours_follow_time_zone() {
        let history = readings_at_hour(23, &[100.0]);
        let plus_two = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let profile = hourly_profile_in(&history, &plus_two);
        assert_eq!(profile[0].hour, 1);
    }

    #[test]
    fn test_summarize_is_idempotent() {
        let history = readings_at_hour(9, &[95.0, 143.2, 201.7, 66.1, 180.0, 54.9, 251.3]);
        let first = summarize_in(&history, &Utc).unwrap();
        let second = summarize_in(&history, &Utc).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.cv.to_bits(), second.cv.to_bits());
    }

    #[test]
    fn test_period_from_unordered_history() {
        let mut history = readings_at_hour(9, &[100.0, 110.0, 120.0]);
        history.reverse();
        let summary = summarize_in(&history, &Utc).unwrap();
        assert!(summary.period_start < summary.period_end);
        assert_eq!(summary.period_start, history[2].timestamp);
    }

    #[test]
    fn test_control_labels() {
        assert_eq!(ControlLabel::classify(99.0, 20.0), ControlLabel::Excellent);
        assert_eq!(ControlLabel::classify(100.0, 20.0), ControlLabel::Good);
        assert_eq!(ControlLabel::classify(153.9, 35.9), ControlLabel::Good);
        assert_eq!(ControlLabel::classify(154.0, 20.0), ControlLabel::NeedsImprovement);
        assert_eq!(ControlLabel::classify(90.0, 36.0), ControlLabel::NeedsImprovement);
        assert_eq!(ControlLabel::NeedsImprovement.to_string(), "Needs Improvement");
    }
}
