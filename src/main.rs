//! GlucoTrack CGM Simulator
//!
//! Simulates a continuous glucose monitor, raises high/low alerts with
//! hysteresis and builds Ambulatory Glucose Profile reports from the
//! stored history.
//!
//! Usage:
//!   glucotrack                   - Live simulation (one reading per tick)
//!   glucotrack simulate [hours]  - Fast replay of past hours into the log
//!   glucotrack report [file.pdf] - AGP report from the stored history
//!   glucotrack --help            - Show help
//!   GLUCOTRACK_DBG=1 glucotrack  - Enable debug output

mod alert;
mod config;
mod error;
mod export;
mod reading;
mod session;
mod simulator;
mod stats;
mod storage;
mod ticker;
mod trend;
mod units;

use std::env;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, Timelike, Utc};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{config_file_path, default_database_path, default_export_dir, ensure_data_dir, Config, Settings};
use crate::error::GlucoTrackError;
use crate::reading::{EventType, Reading};
use crate::session::{DashboardUpdate, MonitorSession, ReadingSink};
use crate::simulator::GlucoseSimulator;
use crate::storage::{BackgroundWriter, ReadingStore, Storage};
use crate::ticker::Ticker;
use crate::units::MgDl;

/// Simulated sensor interval used by the replay
const REPLAY_STEP_SECONDS: i64 = 30;
/// Local hours at which the replay logs a meal
const REPLAY_MEAL_HOURS: [u32; 3] = [8, 13, 19];
const DEFAULT_REPLAY_HOURS: i64 = 24;
/// Longest replay, 90 days
const MAX_REPLAY_HOURS: i64 = 90 * 24;

fn main() -> Result<(), GlucoTrackError> {
    let args: Vec<String> = env::args().collect();

    // Check for debug mode
    let debug_mode = env::var("GLUCOTRACK_DBG").is_ok();

    if debug_mode {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    }

    if let Err(e) = ensure_data_dir() {
        eprintln!("Warning: Could not create data directory: {}", e);
    }

    let cfg_path = config_file_path();
    if !cfg_path.exists() {
        if let Err(e) = Config::create_default(&cfg_path) {
            warn!("Could not create default config: {}", e);
        }
    }

    // Data directory first, then current directory
    let config = match Config::load(&cfg_path).or_else(|_| Config::load("config.txt")) {
        Ok((config, skipped)) => {
            for message in skipped {
                eprintln!("Warning: config: {}, using the default for that key", message);
            }
            config
        }
        Err(e) => {
            warn!("Could not load config: {}. Using defaults.", e);
            Config::default()
        }
    };

    let db_path = config
        .database_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(default_database_path);

    match args.get(1).map(|s| s.as_str()) {
        None | Some("run") => cmd_run(&config, &db_path)?,
        Some("simulate") | Some("replay") => cmd_simulate(&config, &db_path, args.get(2))?,
        Some("history") | Some("log") => cmd_history(&db_path, args.get(2))?,
        Some("unlog") => cmd_unlog(&db_path, args.get(2))?,
        Some("report") => cmd_report(&config, &db_path, &args[2..])?,
        Some("settings") => cmd_settings(&args[2..])?,
        Some("path") | Some("paths") => cmd_show_paths(&db_path),
        Some("--help") | Some("-h") | Some("help") => print_help(),
        Some("--version") | Some("-V") => println!("glucotrack {}", env!("CARGO_PKG_VERSION")),
        Some(other) => {
            print_help();
            return Err(GlucoTrackError::InvalidInput(format!("unknown command '{}'", other)));
        }
    }

    Ok(())
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            info!("Using fixed seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    }
}

/// Live simulation until "quit" or end of input
fn cmd_run(config: &Config, db_path: &Path) -> Result<(), GlucoTrackError> {
    let writer = BackgroundWriter::spawn(db_path.to_path_buf())?;
    let thresholds = Settings::load().thresholds();
    let simulator = GlucoseSimulator::new(config.profile, Utc::now(), make_rng(config.seed));
    let session = Arc::new(Mutex::new(MonitorSession::new(simulator, thresholds, writer)));

    eprintln!("GlucoTrack live simulation ({} s per reading)", config.tick_seconds);
    eprintln!("Alerts: {}", thresholds.format_range());
    eprintln!("Commands: meal, exercise, insulin, status, thresholds <high> <low>, quit");

    let tick_session = Arc::clone(&session);
    let ticker = Ticker::start(std::time::Duration::from_secs(config.tick_seconds), move |_| {
        let update = match tick_session.lock() {
            Ok(mut session) => session.step_at(Utc::now()),
            Err(_) => {
                warn!("Session lock poisoned, skipping tick");
                return;
            }
        };
        print_update(&update);
    });

    for line in io::stdin().lock().lines() {
        let line = line?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if matches!(command, "q" | "quit" | "exit") {
            break;
        }

        let Ok(mut session) = session.lock() else {
            warn!("Session lock poisoned, stopping");
            break;
        };
        let mut words = command.split_whitespace();
        match words.next() {
            Some("status") => print_status(&*session),
            Some("thresholds") => {
                let words: Vec<&str> = words.collect();
                match parse_settings(&words) {
                    Ok(settings) => {
                        session.set_thresholds(settings.thresholds());
                        if let Err(e) = settings.save() {
                            warn!("Could not save settings: {}", e);
                        }
                        println!("Alerts set to {}", settings.thresholds().format_range());
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ => match command.parse::<EventType>() {
                Ok(event) => {
                    let reading = session.log_event(event, Utc::now());
                    println!("Logged {} at {}", event, MgDl(reading.value).format());
                }
                Err(e) => eprintln!("{}", e),
            },
        }
    }

    let ticks = ticker.stop();
    info!("Simulation stopped after {} ticks", ticks);

    // the ticker closure held the other handle and is gone after stop()
    match Arc::try_unwrap(session) {
        Ok(session) => {
            let session = session
                .into_inner()
                .map_err(|_| GlucoTrackError::InvalidInput("session lock poisoned".into()))?;
            let written = session.into_sink().shutdown();
            eprintln!("Saved {} readings to {}", written, db_path.display());
        }
        Err(_) => warn!("Session still shared, pending readings flush on exit"),
    }

    Ok(())
}

fn print_update(update: &DashboardUpdate) {
    let reading = &update.reading;
    println!(
        "{}  {:>11} {}  {}",
        reading.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        MgDl(reading.value).format(),
        update.trend.arrow(),
        update.range.status()
    );
    if let Some(alert) = &update.alert {
        println!("  ** [{}] {}: {}", alert.kind.notification_id(), alert.kind.title(), alert.message);
    }
}

fn print_status<R: Rng, S: ReadingSink>(session: &MonitorSession<R, S>) {
    let simulator = session.simulator();
    let state = simulator.state();
    let profile = simulator.profile();
    let alerts = session.alert_state();

    println!("Mode:        {}", state.mode);
    println!("Current:     {}", MgDl(state.current_value).format());
    println!("Basal rate:  {}", MgDl(state.basal_rate).format());
    println!(
        "Profile:     {}{}",
        if profile.diabetic { "diabetic" } else { "non-diabetic" },
        if profile.senior { ", senior" } else { "" }
    );
    match session.trend().change_per_minute() {
        Some(rate) => println!("Trend:       {:+.1} mg/dL/min over {} readings", rate, session.trend().len()),
        None if session.trend().is_empty() => println!("Trend:       no readings yet"),
        None => println!("Trend:       not enough readings"),
    }
    println!("Alerts:      {}", session.thresholds().format_range());
    println!(
        "Active:      high {}, low {}",
        if alerts.high_alert_active { "on" } else { "off" },
        if alerts.low_alert_active { "on" } else { "off" }
    );
}

/// Replay `hours` of simulated time ending now, with meals at the usual hours
fn cmd_simulate(config: &Config, db_path: &Path, hours: Option<&String>) -> Result<(), GlucoTrackError> {
    let hours = parse_replay_hours(hours.map(String::as_str))?;

    let step = Duration::seconds(REPLAY_STEP_SECONDS);
    let ticks = hours * 3600 / REPLAY_STEP_SECONDS;
    let start = Utc::now() - Duration::hours(hours);

    let thresholds = Settings::load().thresholds();
    let simulator = GlucoseSimulator::new(config.profile, start, make_rng(config.seed));
    let mut session = MonitorSession::new(simulator, thresholds, Vec::with_capacity(ticks as usize));

    let mut alerts = 0;
    for _ in 0..ticks {
        let now = session.simulator().clock() + step;
        let local = now.with_timezone(&Local);
        // exactly one 30 s tick per minute lands in the first half
        if REPLAY_MEAL_HOURS.contains(&local.hour()) && local.minute() == 0 && local.second() < 30 {
            session.log_event(EventType::Meal, now);
        }
        if session.step(step).alert.is_some() {
            alerts += 1;
        }
    }

    let readings = session.into_sink();
    let mut storage = Storage::new(db_path)?;
    let imported = storage.import_readings(&readings)?;
    let total = storage.count()?;

    info!("Replayed {} ticks over {} hours", ticks, hours);
    eprintln!("Simulated {} hours ({} readings, {} alerts)", hours, imported, alerts);
    eprintln!("  Total in DB:     {}", total);
    eprintln!("Saved to: {}", db_path.display());
    Ok(())
}

fn parse_replay_hours(arg: Option<&str>) -> Result<i64, GlucoTrackError> {
    let Some(arg) = arg else {
        return Ok(DEFAULT_REPLAY_HOURS);
    };
    arg.parse::<i64>()
        .ok()
        .filter(|h| (1..=MAX_REPLAY_HOURS).contains(h))
        .ok_or_else(|| {
            GlucoTrackError::InvalidInput(format!("invalid hour count '{}' (1 to {})", arg, MAX_REPLAY_HOURS))
        })
}

/// Most recent readings, newest first
fn cmd_history(db_path: &Path, limit: Option<&String>) -> Result<(), GlucoTrackError> {
    let limit = match limit {
        Some(n) => n
            .parse::<usize>()
            .map_err(|_| GlucoTrackError::InvalidInput(format!("invalid limit '{}'", n)))?,
        None => 50,
    };

    let storage = Storage::new(db_path)?;
    let readings = storage.list_all()?;
    if readings.is_empty() {
        eprintln!("No readings stored yet.");
        return Ok(());
    }

    println!("{:>8}  {:<19}  {:>11}  Event", "ID", "Time", "Glucose");
    for reading in readings.iter().take(limit) {
        print_history_row(reading);
    }
    eprintln!("Showing {} of {} readings", readings.len().min(limit), readings.len());
    Ok(())
}

fn print_history_row(reading: &Reading) {
    println!(
        "{:>8}  {:<19}  {:>11}  {}",
        reading.id.map(|id| id.to_string()).unwrap_or_default(),
        reading.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        MgDl(reading.value).format(),
        reading.event.map(EventType::as_str).unwrap_or("")
    );
}

/// Remove the event tag from one reading
fn cmd_unlog(db_path: &Path, id: Option<&String>) -> Result<(), GlucoTrackError> {
    let id = id
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| GlucoTrackError::InvalidInput("usage: glucotrack unlog <id>".into()))?;

    let storage = Storage::new(db_path)?;
    if storage.clear_event_tag(id)? {
        eprintln!("Removed event tag from reading {}", id);
    } else {
        eprintln!("No reading with id {}", id);
    }
    Ok(())
}

/// Print the AGP summary and write the PDF (and optionally JSON) report
fn cmd_report(config: &Config, db_path: &Path, args: &[String]) -> Result<(), GlucoTrackError> {
    let mut pdf_path = None;
    let mut json_path = None;
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        if arg == "--json" {
            let path = rest
                .next()
                .ok_or_else(|| GlucoTrackError::InvalidInput("--json needs a file path".into()))?;
            json_path = Some(PathBuf::from(path));
        } else {
            pdf_path = Some(PathBuf::from(arg));
        }
    }

    let storage = Storage::new(db_path)?;
    let history = storage.list_ascending()?;

    let summary = match stats::report_summary(&history) {
        Ok(summary) => summary,
        Err(GlucoTrackError::NotEnoughData { have, need }) => {
            eprintln!("Not enough data to generate a report.");
            eprintln!("  Have {} readings, need at least {}.", have, need);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    println!("{}", export::summary_text(&summary));

    let pdf_path = pdf_path.unwrap_or_else(|| {
        default_export_dir().join(format!(
            "GlucoTrack_AGP_Report_{}.pdf",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    let events: Vec<Reading> = history.into_iter().filter(|r| r.event.is_some()).collect();
    export::export_to_pdf(&pdf_path, &summary, &events, &config.patient_name, Settings::load().thresholds())?;
    eprintln!("Report saved to: {}", pdf_path.display());

    if let Some(json_path) = json_path {
        export::export_to_json(&json_path, &summary)?;
        eprintln!("Summary JSON saved to: {}", json_path.display());
    }
    Ok(())
}

/// Show or update the alert thresholds
fn cmd_settings(args: &[String]) -> Result<(), GlucoTrackError> {
    match args {
        [] => {
            let settings = Settings::load();
            println!("High alert: {}", MgDl(f64::from(settings.high_threshold)).format());
            println!("Low alert:  {}", MgDl(f64::from(settings.low_threshold)).format());
        }
        _ => {
            let words: Vec<&str> = args.iter().map(String::as_str).collect();
            let settings = parse_settings(&words)?;
            settings.save()?;
            eprintln!("Alerts set to {}", settings.thresholds().format_range());
        }
    }
    Ok(())
}

/// "<high> <low>" as validated settings
fn parse_settings(words: &[&str]) -> Result<Settings, GlucoTrackError> {
    let [high, low] = words else {
        return Err(GlucoTrackError::InvalidInput("expected <high> <low>".into()));
    };
    let parse = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| GlucoTrackError::InvalidInput(format!("invalid threshold '{}'", s)))
    };
    let settings = Settings { high_threshold: parse(*high)?, low_threshold: parse(*low)? };
    settings.validate()?;
    Ok(settings)
}

fn cmd_show_paths(db_path: &Path) {
    use crate::config::{get_data_dir, settings_file_path};

    println!("GlucoTrack Data Paths:");
    println!("  Data directory:  {}", get_data_dir().display());
    println!("  Database:        {}", db_path.display());
    println!("  Config file:     {}", config_file_path().display());
    println!("  Settings file:   {}", settings_file_path().display());
    println!("  Export default:  {}", default_export_dir().display());
}

fn print_help() {
    eprintln!("GlucoTrack CGM Simulator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  glucotrack [run]                    Live simulation");
    eprintln!("      meal | exercise | insulin       Log an event");
    eprintln!("      status                          Show simulator and alert state");
    eprintln!("      thresholds <high> <low>         Change alert thresholds");
    eprintln!("      quit                            Stop and flush readings");
    eprintln!("  glucotrack simulate [hours]         Replay past hours into the log (default 24)");
    eprintln!("  glucotrack history [limit]          Show stored readings, newest first");
    eprintln!("  glucotrack unlog <id>               Remove the event tag from a reading");
    eprintln!("  glucotrack report [pdf] [--json f]  AGP report (needs 10 readings)");
    eprintln!("  glucotrack settings [high low]      Show or set alert thresholds");
    eprintln!("  glucotrack path                     Show data file locations");
    eprintln!("  glucotrack help                     Show this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("  GLUCOTRACK_DBG=1                    Enable debug output");
    eprintln!();
    eprintln!("DATA LOCATIONS:");
    eprintln!("  Database:  {}", default_database_path().display());
    eprintln!("  Config:    {}", config_file_path().display());
}
