//! Error types for the GlucoTrack application

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlucoTrackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("No readings to summarize")]
    InsufficientData,

    #[error("Not enough data to generate a report ({have} readings, need {need})")]
    NotEnoughData { have: usize, need: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),
}
