//! Live monitoring pipeline
//!
//! Each tick runs simulator -> trend -> alerts -> persistence in order.
//! The session is the single owner of simulator and alert state.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::Rng;
use serde::Serialize;

use crate::alert::{self, Alert, AlertState};
use crate::reading::{EventType, Reading};
use crate::simulator::GlucoseSimulator;
use crate::storage::BackgroundWriter;
use crate::trend::{Trend, TrendAnalyzer};
use crate::units::{GlucoseRange, Thresholds};

/// Where the session sends readings. Must not block the tick.
pub trait ReadingSink {
    fn persist(&mut self, reading: Reading);
}

impl ReadingSink for BackgroundWriter {
    fn persist(&mut self, reading: Reading) {
        self.append(reading);
    }
}

/// Collects readings in memory, used by replays and tests
impl ReadingSink for Vec<Reading> {
    fn persist(&mut self, reading: Reading) {
        self.push(reading);
    }
}

/// Dashboard state after one tick
#[derive(Debug, Clone, Serialize)]
pub struct DashboardUpdate {
    pub reading: Reading,
    pub trend: Trend,
    pub range: GlucoseRange,
    pub alert: Option<Alert>,
}

pub struct MonitorSession<R: Rng, S: ReadingSink> {
    simulator: GlucoseSimulator<R>,
    trend: TrendAnalyzer,
    alert_state: AlertState,
    thresholds: Thresholds,
    sink: S,
}

impl<R: Rng, S: ReadingSink> MonitorSession<R, S> {
    pub fn new(simulator: GlucoseSimulator<R>, thresholds: Thresholds, sink: S) -> Self {
        Self {
            simulator,
            trend: TrendAnalyzer::new(),
            alert_state: AlertState::default(),
            thresholds,
            sink,
        }
    }

    /// Advance simulated time by `delta` and run one tick
    pub fn step(&mut self, delta: Duration) -> DashboardUpdate {
        let reading = self.simulator.advance(delta);
        self.process(reading)
    }

    /// Run one tick at `now` (wall clock or replayed timestamp)
    pub fn step_at(&mut self, now: DateTime<Utc>) -> DashboardUpdate {
        let reading = self.simulator.tick_at(now);
        self.process(reading)
    }

    /// Log a user event; the tagged reading is persisted straight away
    pub fn log_event(&mut self, event: EventType, now: DateTime<Utc>) -> Reading {
        let reading = self.simulator.log_event_at(event, now);
        self.sink.persist(reading.clone());
        reading
    }

    /// New thresholds apply from the next tick; alert flags are kept
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        info!("Alert thresholds set to {}", thresholds.format_range());
        self.thresholds = thresholds;
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn alert_state(&self) -> AlertState {
        self.alert_state
    }

    pub fn simulator(&self) -> &GlucoseSimulator<R> {
        &self.simulator
    }

    pub fn trend(&self) -> &TrendAnalyzer {
        &self.trend
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn process(&mut self, reading: Reading) -> DashboardUpdate {
        let trend = self.trend.push(&reading);
        let (next, alert) = alert::evaluate(&reading, self.thresholds, self.alert_state);
        self.alert_state = next;

        if let Some(alert) = &alert {
            warn!("{}: {}", alert.kind.title(), alert.message);
        }

        self.sink.persist(reading.clone());

        DashboardUpdate {
            range: GlucoseRange::classify(reading.value),
            reading,
            trend,
            alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{Profile, SimulationMode, SimulationState};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
    }

    fn session_at(value: f64) -> MonitorSession<StdRng, Vec<Reading>> {
        let sim = GlucoseSimulator::with_state(
            Profile::default(),
            SimulationState::fasting(value),
            start(),
            StdRng::seed_from_u64(5),
        );
        MonitorSession::new(sim, Thresholds::default(), Vec::new())
    }

    #[test]
    fn test_every_tick_is_persisted() {
        let mut session = session_at(100.0);
        for _ in 0..10 {
            session.step(Duration::seconds(30));
        }
        let meal = session.log_event(EventType::Meal, start() + Duration::minutes(6));
        assert_eq!(meal.event, Some(EventType::Meal));

        let stored = session.into_sink();
        assert_eq!(stored.len(), 11);
        assert_eq!(stored.iter().filter(|r| r.event.is_some()).count(), 1);
    }

    #[test]
    fn test_high_alert_fires_once_while_elevated() {
        // basal well above the high threshold keeps every tick high
        let mut session = session_at(260.0);
        let alerts: Vec<_> = (0..20)
            .map(|_| session.step(Duration::seconds(30)).alert)
            .collect();

        assert!(alerts[0].is_some());
        assert!(alerts[1..].iter().all(Option::is_none));
        assert!(session.alert_state().high_alert_active);
    }

    #[test]
    fn test_update_carries_range_and_trend() {
        let mut session = session_at(300.0);
        let update = session.step(Duration::seconds(30));
        assert_eq!(update.range, GlucoseRange::VeryHigh);
        assert_eq!(update.trend, Trend::Flat);
    }

    #[test]
    fn test_meal_drives_rising_trend() {
        let profile = Profile { diabetic: true, ..Profile::default() };
        let mut state = SimulationState::fasting(120.0);
        state.mode = SimulationMode::PostprandialRising;
        state.meal_start = Some(start());
        state.peak_value = 300.0;
        state.time_to_peak_minutes = 50.0;
        let sim = GlucoseSimulator::with_state(profile, state, start(), StdRng::seed_from_u64(2));
        let mut session = MonitorSession::new(sim, Thresholds::default(), Vec::new());

        let mut last = None;
        for minute in 1..=20 {
            last = Some(session.step_at(start() + Duration::minutes(minute)));
        }
        // 3.6 mg/dL per minute ramp over a full window
        assert_eq!(last.unwrap().trend, Trend::Rising);
    }
}
