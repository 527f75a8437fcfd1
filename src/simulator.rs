//! Physiological glucose simulation
//!
//! A three-state machine (fasting, rising after a meal, falling back to
//! basal) advanced one tick at a time by an external driver. The driver
//! decides the cadence: the live ticker, a fast replay, or a test.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GlucoTrackError;
use crate::reading::{EventType, Reading};

/// Simulator output is always clamped into this band (mg/dL)
pub const MIN_GLUCOSE: f64 = 45.0;
pub const MAX_GLUCOSE: f64 = 400.0;

/// Per-tick relaxation toward basal while fasting
const FASTING_DECAY: f64 = 0.1;
/// Uniform sensor noise amplitude (mg/dL)
const NOISE_AMPLITUDE: f64 = 3.0;
/// Minutes from meal start to peak are drawn from this range
const TIME_TO_PEAK_MINUTES: (f64, f64) = (45.0, 60.0);

/// Meal size chosen in the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MealSize {
    Light,
    Balanced,
    Heavy,
}

impl MealSize {
    /// Spike magnitude range (mg/dL) above the current value
    fn spike_range(self, diabetic: bool) -> (f64, f64) {
        match (self, diabetic) {
            (MealSize::Light, true) => (30.0, 60.0),
            (MealSize::Light, false) => (10.0, 20.0),
            (MealSize::Balanced, true) => (50.0, 90.0),
            (MealSize::Balanced, false) => (20.0, 40.0),
            (MealSize::Heavy, true) => (80.0, 180.0),
            (MealSize::Heavy, false) => (40.0, 70.0),
        }
    }

    /// Minutes from peak back to basal
    fn recovery_range(self, diabetic: bool) -> (f64, f64) {
        match (self, diabetic) {
            (MealSize::Light, true) => (120.0, 180.0),
            (MealSize::Light, false) => (60.0, 90.0),
            (MealSize::Balanced, true) => (120.0, 240.0),
            (MealSize::Balanced, false) => (90.0, 120.0),
            (MealSize::Heavy, true) => (180.0, 360.0),
            (MealSize::Heavy, false) => (120.0, 180.0),
        }
    }
}

impl FromStr for MealSize {
    type Err = GlucoTrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.starts_with("light") {
            Ok(MealSize::Light)
        } else if lower.starts_with("balanced") {
            Ok(MealSize::Balanced)
        } else if lower.starts_with("heavy") {
            Ok(MealSize::Heavy)
        } else {
            Err(GlucoTrackError::Config(format!("unknown meal type '{}'", s)))
        }
    }
}

/// Simulated person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub diabetic: bool,
    pub senior: bool,
    /// Size of every logged meal; `None` behaves as a balanced meal
    pub meal_size: Option<MealSize>,
}

impl Profile {
    /// Build a profile from an age category label such as "Senior (65+)"
    pub fn from_age_category(diabetic: bool, age_category: &str, meal_size: Option<MealSize>) -> Self {
        Self {
            diabetic,
            senior: age_category.to_ascii_lowercase().contains("senior"),
            meal_size,
        }
    }

    /// Interval the basal rate is drawn from
    fn basal_range(&self) -> (f64, f64) {
        match (self.diabetic, self.senior) {
            (true, true) => (90.0, 200.0),
            (true, false) => (80.0, 180.0),
            (false, _) => (70.0, 99.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationMode {
    Fasting,
    PostprandialRising,
    PostprandialFalling,
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationMode::Fasting => "fasting",
            SimulationMode::PostprandialRising => "post-meal rising",
            SimulationMode::PostprandialFalling => "post-meal falling",
        };
        f.write_str(name)
    }
}

/// Mutable state of the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub mode: SimulationMode,
    pub basal_rate: f64,
    pub current_value: f64,
    pub meal_start: Option<DateTime<Utc>>,
    pub peak_value: f64,
    pub time_to_peak_minutes: f64,
    pub recovery_duration_minutes: f64,
}

impl SimulationState {
    /// Fasting at the given basal rate
    pub fn fasting(basal_rate: f64) -> Self {
        Self {
            mode: SimulationMode::Fasting,
            basal_rate,
            current_value: basal_rate,
            meal_start: None,
            peak_value: 0.0,
            time_to_peak_minutes: 50.0,
            recovery_duration_minutes: 120.0,
        }
    }
}

/// Glucose simulator driven by explicit time steps
pub struct GlucoseSimulator<R: Rng> {
    profile: Profile,
    state: SimulationState,
    clock: DateTime<Utc>,
    rng: R,
}

impl<R: Rng> GlucoseSimulator<R> {
    /// Start fasting at a basal rate drawn for the profile
    pub fn new(profile: Profile, start: DateTime<Utc>, mut rng: R) -> Self {
        let (lo, hi) = profile.basal_range();
        let basal = rng.gen_range(lo..hi);
        info!("Simulator started: basal {:.1} mg/dL ({:?})", basal, profile);
        Self::with_state(profile, SimulationState::fasting(basal), start, rng)
    }

    /// Resume from a known state
    pub fn with_state(profile: Profile, state: SimulationState, start: DateTime<Utc>, rng: R) -> Self {
        Self { profile, state, clock: start, rng }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Simulated time of the last tick or event
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    /// Move the clock forward by `delta` and emit the next reading
    pub fn advance(&mut self, delta: Duration) -> Reading {
        let now = self.clock + delta;
        self.tick_at(now)
    }

    /// Emit the reading for `now`
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Reading {
        self.clock = now;
        self.step_mode(now);

        let noise = self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE);
        self.state.current_value = (self.state.current_value + noise).clamp(MIN_GLUCOSE, MAX_GLUCOSE);

        debug!("tick {} -> {:.1} mg/dL ({})", now, self.state.current_value, self.state.mode);
        Reading::new(now, self.state.current_value)
    }

    /// Log a user event and return the tagged reading to persist.
    /// Only meals change the state machine.
    pub fn log_event_at(&mut self, event: EventType, now: DateTime<Utc>) -> Reading {
        if event == EventType::Meal {
            let size = self.profile.meal_size.unwrap_or(MealSize::Balanced);
            let (spike_lo, spike_hi) = size.spike_range(self.profile.diabetic);
            let (rec_lo, rec_hi) = size.recovery_range(self.profile.diabetic);
            let spike = self.rng.gen_range(spike_lo..spike_hi);

            self.state.recovery_duration_minutes = self.rng.gen_range(rec_lo..rec_hi);
            self.state.mode = SimulationMode::PostprandialRising;
            self.state.meal_start = Some(now);
            self.state.peak_value = self.state.current_value + spike;
            self.state.time_to_peak_minutes = self.rng.gen_range(TIME_TO_PEAK_MINUTES.0..TIME_TO_PEAK_MINUTES.1);

            info!(
                "Meal logged ({:?}): peak {:.1} mg/dL in {:.0} min, recovery {:.0} min",
                size, self.state.peak_value, self.state.time_to_peak_minutes, self.state.recovery_duration_minutes
            );
        } else {
            info!("{} logged", event);
        }

        Reading::with_event(now, self.state.current_value, event)
    }

    /// Mode-specific update before noise
    fn step_mode(&mut self, now: DateTime<Utc>) {
        let minutes_since_meal = match self.state.meal_start {
            Some(start) => (now - start).num_minutes() as f64,
            None => f64::INFINITY,
        };
        let s = &mut self.state;

        match s.mode {
            SimulationMode::PostprandialRising => {
                if minutes_since_meal >= s.time_to_peak_minutes {
                    s.mode = SimulationMode::PostprandialFalling;
                } else {
                    let progress = minutes_since_meal / s.time_to_peak_minutes;
                    s.current_value = s.basal_rate + (s.peak_value - s.basal_rate) * progress;
                }
            }
            SimulationMode::PostprandialFalling => {
                let minutes_after_peak = minutes_since_meal - s.time_to_peak_minutes;
                if minutes_after_peak >= s.recovery_duration_minutes {
                    s.mode = SimulationMode::Fasting;
                    s.current_value = s.basal_rate;
                } else {
                    let progress = minutes_after_peak / s.recovery_duration_minutes;
                    s.current_value = s.peak_value - (s.peak_value - s.basal_rate) * progress;
                }
            }
            SimulationMode::Fasting => {
                s.current_value += (s.basal_rate - s.current_value) * FASTING_DECAY;
            }
        }
    }
}
