//! High/low glucose alerts with repeat suppression
//!
//! An alert fires once when the value leaves the normal band and is
//! re-armed only after the value comes back into `[low, high]`.

use serde::{Deserialize, Serialize};

use crate::reading::Reading;
use crate::units::{MgDl, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    High,
    Low,
}

impl AlertKind {
    pub fn title(self) -> &'static str {
        match self {
            AlertKind::High => "High Glucose Alert",
            AlertKind::Low => "Low Glucose Alert",
        }
    }

    /// Notification id, one per alert kind
    pub fn notification_id(self) -> u32 {
        match self {
            AlertKind::High => 1,
            AlertKind::Low => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    fn new(kind: AlertKind, value: f64) -> Self {
        Self {
            kind,
            message: format!("Your glucose is {}.", MgDl(value).format()),
        }
    }
}

/// Which alerts have already fired for the current excursion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertState {
    pub high_alert_active: bool,
    pub low_alert_active: bool,
}

/// Decide whether `reading` raises an alert. Returns the next state.
pub fn evaluate(reading: &Reading, thresholds: Thresholds, state: AlertState) -> (AlertState, Option<Alert>) {
    let value = reading.value;

    if value > thresholds.high as f64 {
        if state.high_alert_active {
            return (state, None);
        }
        let next = AlertState { high_alert_active: true, ..state };
        (next, Some(Alert::new(AlertKind::High, value)))
    } else if value < thresholds.low as f64 {
        if state.low_alert_active {
            return (state, None);
        }
        let next = AlertState { low_alert_active: true, ..state };
        (next, Some(Alert::new(AlertKind::Low, value)))
    } else {
        (AlertState::default(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn run(values: &[f64]) -> Vec<Option<AlertKind>> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut state = AlertState::default();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let reading = Reading::new(base + Duration::seconds(30 * i as i64), v);
                let (next, alert) = evaluate(&reading, Thresholds::default(), state);
                state = next;
                alert.map(|a| a.kind)
            })
            .collect()
    }

    #[test]
    fn test_high_alert_rearms_after_normal() {
        let fired = run(&[190.0, 190.0, 150.0, 190.0]);
        assert_eq!(fired, vec![Some(AlertKind::High), None, None, Some(AlertKind::High)]);
    }

    #[test]
    fn test_low_alert_fires_once_per_excursion() {
        let fired = run(&[65.0, 60.0, 55.0, 70.0, 69.0]);
        assert_eq!(fired, vec![Some(AlertKind::Low), None, None, None, Some(AlertKind::Low)]);
    }

    #[test]
    fn test_swing_from_high_to_low() {
        // high flag survives a direct jump to low; only the normal band clears it
        let fired = run(&[200.0, 60.0, 200.0, 100.0, 200.0]);
        assert_eq!(
            fired,
            vec![Some(AlertKind::High), Some(AlertKind::Low), None, None, Some(AlertKind::High)]
        );
    }

    #[test]
    fn test_boundaries_are_normal() {
        assert_eq!(run(&[180.0, 70.0]), vec![None, None]);
    }

    #[test]
    fn test_alert_message() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let (state, alert) = evaluate(&Reading::new(base, 212.7), Thresholds::default(), AlertState::default());
        let alert = alert.unwrap();
        assert!(state.high_alert_active);
        assert_eq!(alert.kind.title(), "High Glucose Alert");
        assert_eq!(alert.message, "Your glucose is 212 mg/dL.");
        assert_eq!(alert.kind.notification_id(), 1);
    }
}
