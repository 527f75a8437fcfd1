//! Configuration file parsing, user settings and data locations

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::GlucoTrackError;
use crate::simulator::{MealSize, Profile};
use crate::units::Thresholds;

const APP_DIR: &str = "glucotrack";

/// Default tick period of the live simulation
pub const DEFAULT_TICK_SECONDS: u64 = 30;

const DEFAULT_CONFIG: &str = "\
# GlucoTrack configuration
# key value  # comment

# database_path /path/to/glucotrack.db
# patient_name Jane Doe
tick_seconds 30
# seed 42
diabetic 0
age_category Adult
meal_type balanced
";

/// Configuration loaded from config.txt
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: Option<String>,
    /// Name printed on reports
    pub patient_name: String,
    pub tick_seconds: u64,
    /// Fixed seed for reproducible runs, entropy otherwise
    pub seed: Option<u64>,
    pub profile: Profile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            patient_name: "User".to_string(),
            tick_seconds: DEFAULT_TICK_SECONDS,
            seed: None,
            profile: Profile::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file. Keys with bad values keep their
    /// defaults and are returned as messages next to the config.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<String>), GlucoTrackError> {
        let file = File::open(path)?;
        let mut entries = HashMap::new();

        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // "key value" or "key value # comment"
            if let Some((key, rest)) = Self::parse_line(line) {
                let value = rest.split('#').next().unwrap_or("").trim();
                entries.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Self::from_entries(&entries))
    }

    fn from_entries(entries: &HashMap<String, String>) -> (Self, Vec<String>) {
        let mut config = Config::default();
        let mut skipped = Vec::new();

        if let Some(path) = entries.get("database_path").filter(|p| !p.is_empty()) {
            config.database_path = Some(path.clone());
        }
        if let Some(name) = entries.get("patient_name").filter(|n| !n.is_empty()) {
            config.patient_name = name.clone();
        }
        if let Some(secs) = entries.get("tick_seconds") {
            match secs.parse::<u64>().ok().filter(|&s| s > 0) {
                Some(secs) => config.tick_seconds = secs,
                None => skipped.push(format!("invalid tick_seconds '{}'", secs)),
            }
        }
        if let Some(seed) = entries.get("seed") {
            match seed.parse::<u64>() {
                Ok(seed) => config.seed = Some(seed),
                Err(_) => skipped.push(format!("invalid seed '{}'", seed)),
            }
        }

        let diabetic = entries.get("diabetic").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let age_category = entries.get("age_category").map(String::as_str).unwrap_or("");
        let meal_size = match entries.get("meal_type").filter(|m| !m.is_empty()) {
            Some(m) => match m.parse::<MealSize>() {
                Ok(size) => Some(size),
                Err(e) => {
                    skipped.push(e.to_string());
                    None
                }
            },
            None => None,
        };
        config.profile = Profile::from_age_category(diabetic, age_category, meal_size);

        for message in &skipped {
            warn!("Config: {}, keeping the default", message);
        }
        (config, skipped)
    }

    /// Parse a single config line, returning (key, value)
    fn parse_line(line: &str) -> Option<(&str, &str)> {
        let mut parts = line.splitn(2, |c: char| c.is_whitespace());
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        if key.is_empty() || value.is_empty() {
            return None;
        }

        Some((key, value))
    }

    /// Write a commented default config
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), GlucoTrackError> {
        let mut file = File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;
        Ok(())
    }
}

/// Persistent user settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub high_threshold: i32,
    pub low_threshold: i32,
}

impl Default for Settings {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            high_threshold: thresholds.high,
            low_threshold: thresholds.low,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults on a missing, corrupt or
    /// inconsistent file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        let parsed = fs::read_to_string(path)
            .map_err(GlucoTrackError::from)
            .and_then(|s| serde_json::from_str::<Settings>(&s).map_err(GlucoTrackError::from))
            .and_then(|settings| settings.validate().map(|_| settings));
        match parsed {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not read settings from {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load() -> Self {
        Self::load_from(settings_file_path())
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), GlucoTrackError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), GlucoTrackError> {
        self.save_to(settings_file_path())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds { high: self.high_threshold, low: self.low_threshold }
    }

    /// Reject a low threshold at or above the high threshold
    pub fn validate(&self) -> Result<(), GlucoTrackError> {
        if self.low_threshold >= self.high_threshold {
            return Err(GlucoTrackError::InvalidInput(format!(
                "low threshold {} must be below high threshold {}",
                self.low_threshold, self.high_threshold
            )));
        }
        Ok(())
    }
}

/// OS-specific data directory, falling back to the working directory
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn ensure_data_dir() -> Result<PathBuf, GlucoTrackError> {
    let dir = get_data_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_database_path() -> PathBuf {
    get_data_dir().join("glucotrack.db")
}

pub fn config_file_path() -> PathBuf {
    get_data_dir().join("config.txt")
}

pub fn settings_file_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

/// Where reports are written by default
pub fn default_export_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
