//! Glucose readings and logged events

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GlucoTrackError;

/// User-logged event attached to a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Meal,
    Exercise,
    Insulin,
}

impl EventType {
    /// Tag as stored in the database
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Meal => "MEAL",
            EventType::Exercise => "EXERCISE",
            EventType::Insulin => "INSULIN",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = GlucoTrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MEAL" => Ok(EventType::Meal),
            "EXERCISE" => Ok(EventType::Exercise),
            "INSULIN" => Ok(EventType::Insulin),
            other => Err(GlucoTrackError::UnknownEvent(other.to_string())),
        }
    }
}

/// A simulated glucose reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Store id, `None` until persisted
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "mg/dL")]
    pub value: f64,
    pub event: Option<EventType>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { id: None, timestamp, value, event: None }
    }

    pub fn with_event(timestamp: DateTime<Utc>, value: f64, event: EventType) -> Self {
        Self { id: None, timestamp, value, event: Some(event) }
    }

    /// Milliseconds since the Unix epoch, the persisted time format
    pub fn epoch_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Rebuild a timestamp from persisted epoch millis
    pub fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis).single()
    }
}
