//! Rate-of-change trend over a trailing 15 minute window

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::reading::Reading;

/// Window length, also the divisor for the per-minute rate
const WINDOW_MINUTES: i64 = 15;
/// mg/dL per minute beyond which the trend is no longer flat
const STEADY_CHANGE_PER_MINUTE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

impl Trend {
    /// Arrow shown next to the current value
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Rising => "↑",
            Trend::Falling => "↓",
            Trend::Flat => "→",
        }
    }
}

/// Keeps the trailing window of readings and classifies the trend
#[derive(Debug, Default)]
pub struct TrendAnalyzer {
    window: VecDeque<(DateTime<Utc>, f64)>,
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reading, drop everything older than 15 minutes, classify
    pub fn push(&mut self, reading: &Reading) -> Trend {
        self.window.push_back((reading.timestamp, reading.value));
        self.evict(reading.timestamp);
        self.classify()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Change between oldest and newest reading spread over the window
    pub fn change_per_minute(&self) -> Option<f64> {
        if self.window.len() < 2 {
            return None;
        }
        let (_, oldest) = self.window.front()?;
        let (_, newest) = self.window.back()?;
        Some((newest - oldest) / WINDOW_MINUTES as f64)
    }

    pub fn classify(&self) -> Trend {
        match self.change_per_minute() {
            Some(rate) if rate > STEADY_CHANGE_PER_MINUTE => Trend::Rising,
            Some(rate) if rate < -STEADY_CHANGE_PER_MINUTE => Trend::Falling,
            _ => Trend::Flat,
        }
    }

    fn evict(&mut self, latest: DateTime<Utc>) {
        let horizon = Duration::minutes(WINDOW_MINUTES);
        while let Some((ts, _)) = self.window.front() {
            if latest - *ts > horizon {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64, value: f64) -> Reading {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Reading::new(base + Duration::minutes(minutes), value)
    }

    #[test]
    fn test_single_reading_is_flat() {
        let mut trend = TrendAnalyzer::new();
        assert_eq!(trend.push(&at(0, 300.0)), Trend::Flat);
        assert!(trend.change_per_minute().is_none());
    }

    #[test]
    fn test_rising_and_falling() {
        let mut trend = TrendAnalyzer::new();
        trend.push(&at(0, 100.0));
        // +31 over the window is 2.07 per minute
        assert_eq!(trend.push(&at(10, 131.0)), Trend::Rising);

        let mut trend = TrendAnalyzer::new();
        trend.push(&at(0, 200.0));
        assert_eq!(trend.push(&at(5, 160.0)), Trend::Falling);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut trend = TrendAnalyzer::new();
        trend.push(&at(0, 100.0));
        assert_eq!(trend.push(&at(15, 130.0)), Trend::Flat);
    }

    #[test]
    fn test_old_readings_are_evicted() {
        let mut trend = TrendAnalyzer::new();
        trend.push(&at(0, 60.0));
        trend.push(&at(10, 100.0));
        // reading at minute 0 is 16 minutes old and leaves the window
        assert_eq!(trend.push(&at(16, 110.0)), Trend::Flat);
        assert_eq!(trend.len(), 2);

        // exactly 15 minutes old stays
        trend.push(&at(25, 100.0));
        assert_eq!(trend.len(), 3);
    }
}
