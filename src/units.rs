//! Glucose values, clinical ranges and alert thresholds
//!
//! All values are carried in mg/dL. The clinical bands used by the AGP
//! report are fixed; the alert thresholds are user-configurable.

use serde::{Deserialize, Serialize};

/// Glucose value in mg/dL (milligrams per deciliter)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MgDl(pub f64);

impl MgDl {
    /// Format the value with unit suffix, truncated to whole mg/dL
    pub fn format(self) -> String {
        format!("{} mg/dL", self.whole())
    }

    /// Whole mg/dL as shown on the dashboard
    pub fn whole(self) -> i32 {
        self.0 as i32
    }
}

/// Clinical band boundaries (mg/dL)
pub const VERY_LOW_MGDL: f64 = 54.0;
pub const TARGET_LOW_MGDL: f64 = 70.0;
pub const TARGET_HIGH_MGDL: f64 = 180.0;
pub const VERY_HIGH_MGDL: f64 = 250.0;

/// Classification of glucose value into the five AGP bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlucoseRange {
    VeryLow,  // < 54
    Low,      // [54, 70)
    InRange,  // [70, 180]
    High,     // (180, 250]
    VeryHigh, // > 250
}

impl GlucoseRange {
    /// Classify a reading. Every finite value lands in exactly one band.
    pub fn classify(mg_dl: f64) -> Self {
        if mg_dl < VERY_LOW_MGDL {
            GlucoseRange::VeryLow
        } else if mg_dl < TARGET_LOW_MGDL {
            GlucoseRange::Low
        } else if mg_dl <= TARGET_HIGH_MGDL {
            GlucoseRange::InRange
        } else if mg_dl <= VERY_HIGH_MGDL {
            GlucoseRange::High
        } else {
            GlucoseRange::VeryHigh
        }
    }

    /// Get a display label for the range
    pub fn label(self) -> &'static str {
        match self {
            GlucoseRange::VeryLow => "Very Low (< 54 mg/dL)",
            GlucoseRange::Low => "Low (54-69 mg/dL)",
            GlucoseRange::InRange => "Target Range (70-180 mg/dL)",
            GlucoseRange::High => "High (181-250 mg/dL)",
            GlucoseRange::VeryHigh => "Very High (> 250 mg/dL)",
        }
    }

    /// Get a short status text
    pub fn status(self) -> &'static str {
        match self {
            GlucoseRange::VeryLow => "VERY LOW",
            GlucoseRange::Low => "LOW",
            GlucoseRange::InRange => "OK",
            GlucoseRange::High => "HIGH",
            GlucoseRange::VeryHigh => "VERY HIGH",
        }
    }
}

/// User alert thresholds (mg/dL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// High threshold - default 180
    pub high: i32,
    /// Low threshold - default 70
    pub low: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { high: 180, low: 70 }
    }
}

impl Thresholds {
    /// Get threshold display string
    pub fn format_range(&self) -> String {
        format!("{}-{} mg/dL", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mgdl_formatting() {
        assert_eq!(MgDl(180.9).format(), "180 mg/dL");
        assert_eq!(MgDl(72.2).whole(), 72);
    }

    #[test]
    fn test_range_boundaries() {
        assert_eq!(GlucoseRange::classify(53.9), GlucoseRange::VeryLow);
        assert_eq!(GlucoseRange::classify(54.0), GlucoseRange::Low);
        assert_eq!(GlucoseRange::classify(69.9), GlucoseRange::Low);
        assert_eq!(GlucoseRange::classify(70.0), GlucoseRange::InRange);
        assert_eq!(GlucoseRange::classify(180.0), GlucoseRange::InRange);
        assert_eq!(GlucoseRange::classify(180.1), GlucoseRange::High);
        assert_eq!(GlucoseRange::classify(250.0), GlucoseRange::High);
        assert_eq!(GlucoseRange::classify(250.1), GlucoseRange::VeryHigh);
    }

    #[test]
    fn test_thresholds_display() {
        assert_eq!(Thresholds::default().format_range(), "70-180 mg/dL");
    }
}
