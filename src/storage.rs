//! SQLite storage for the reading log

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use rusqlite::{params, Connection};

use crate::error::GlucoTrackError;
use crate::reading::{EventType, Reading};

/// Append-only log of readings
pub trait ReadingStore {
    /// Persist a reading, returning its id
    fn append(&self, reading: &Reading) -> Result<i64, GlucoTrackError>;

    /// All readings, newest first
    fn list_all(&self) -> Result<Vec<Reading>, GlucoTrackError>;

    /// All readings, oldest first
    fn list_ascending(&self) -> Result<Vec<Reading>, GlucoTrackError>;

    /// Remove the event tag from a reading; returns whether a row changed
    fn clear_event_tag(&self, id: i64) -> Result<bool, GlucoTrackError>;

    fn count(&self) -> Result<usize, GlucoTrackError>;
}

/// SQLite database for storing readings
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Create or open a database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GlucoTrackError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Private database that lives as long as the handle
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, GlucoTrackError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, GlucoTrackError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS glucose_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                value REAL NOT NULL,
                event_type TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_glucose_history_timestamp
                ON glucose_history(timestamp);"
        )?;

        Ok(Self { conn })
    }

    /// Bulk import in one transaction, returns count of new entries
    pub fn import_readings(&mut self, readings: &[Reading]) -> Result<usize, GlucoTrackError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO glucose_history (timestamp, value, event_type) VALUES (?1, ?2, ?3)"
            )?;
            for reading in readings {
                stmt.execute(params![
                    reading.epoch_millis(),
                    single_precision(reading.value),
                    reading.event.map(EventType::as_str),
                ])?;
            }
        }
        tx.commit()?;
        Ok(readings.len())
    }

    fn query(&self, order: &str) -> Result<Vec<Reading>, GlucoTrackError> {
        let sql = format!(
            "SELECT id, timestamp, value, event_type FROM glucose_history ORDER BY timestamp {}, id {}",
            order, order
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut readings = Vec::new();
        for row in rows {
            let (id, millis, value, event_type) = row?;
            let Some(timestamp) = Reading::timestamp_from_millis(millis) else {
                warn!("Skipping reading {} with invalid timestamp {}", id, millis);
                continue;
            };
            // unknown tags read back as untagged
            let event = event_type.and_then(|tag| tag.parse::<EventType>().ok());
            readings.push(Reading { id: Some(id), timestamp, value, event });
        }

        Ok(readings)
    }
}

/// The log keeps single precision values
fn single_precision(value: f64) -> f64 {
    f64::from(value as f32)
}

impl ReadingStore for Storage {
    fn append(&self, reading: &Reading) -> Result<i64, GlucoTrackError> {
        self.conn.execute(
            "INSERT INTO glucose_history (timestamp, value, event_type) VALUES (?1, ?2, ?3)",
            params![
                reading.epoch_millis(),
                single_precision(reading.value),
                reading.event.map(EventType::as_str),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_all(&self) -> Result<Vec<Reading>, GlucoTrackError> {
        self.query("DESC")
    }

    fn list_ascending(&self) -> Result<Vec<Reading>, GlucoTrackError> {
        self.query("ASC")
    }

    fn clear_event_tag(&self, id: i64) -> Result<bool, GlucoTrackError> {
        let updated = self.conn.execute(
            "UPDATE glucose_history SET event_type = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(updated > 0)
    }

    fn count(&self) -> Result<usize, GlucoTrackError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM glucose_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Message to the writer thread
enum WriteMessage {
    Append(Reading),
    Shutdown,
}

/// Fire-and-forget appends on a dedicated thread with its own connection
pub struct BackgroundWriter {
    sender: Sender<WriteMessage>,
    handle: Option<JoinHandle<usize>>,
}

impl BackgroundWriter {
    /// Open the database on a new thread. Fails if the database cannot be opened.
    pub fn spawn(db_path: PathBuf) -> Result<Self, GlucoTrackError> {
        // open once up front so a bad path is reported to the caller
        Storage::new(&db_path)?;

        let (tx, rx) = channel::<WriteMessage>();
        let handle = thread::spawn(move || {
            let storage = match Storage::new(&db_path) {
                Ok(storage) => storage,
                Err(e) => {
                    warn!("Writer could not open {}: {}", db_path.display(), e);
                    return 0;
                }
            };

            let mut written = 0;
            while let Ok(msg) = rx.recv() {
                match msg {
                    WriteMessage::Append(reading) => match storage.append(&reading) {
                        Ok(id) => {
                            written += 1;
                            debug!("Stored reading {} ({:.1} mg/dL)", id, reading.value);
                        }
                        Err(e) => warn!("Failed to store reading: {}", e),
                    },
                    WriteMessage::Shutdown => break,
                }
            }
            info!("Writer stopped after {} readings", written);
            written
        });

        Ok(Self { sender: tx, handle: Some(handle) })
    }

    /// Queue a reading; never blocks on I/O
    pub fn append(&self, reading: Reading) {
        if self.sender.send(WriteMessage::Append(reading)).is_err() {
            warn!("Writer thread is gone, reading dropped");
        }
    }

    /// Flush queued readings and stop the thread. Returns how many were written.
    pub fn shutdown(mut self) -> usize {
        self.stop()
    }

    fn stop(&mut self) -> usize {
        let _ = self.sender.send(WriteMessage::Shutdown);
        self.handle
            .take()
            .map(|handle| handle.join().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reading(minutes: i64, value: f64, event: Option<EventType>) -> Reading {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Reading { id: None, timestamp: base + Duration::minutes(minutes), value, event }
    }

    #[test]
    fn test_append_and_order() {
        let storage = Storage::in_memory().unwrap();
        storage.append(&reading(10, 120.0, None)).unwrap();
        storage.append(&reading(0, 100.0, Some(EventType::Meal))).unwrap();
        storage.append(&reading(5, 110.0, None)).unwrap();

        assert_eq!(storage.count().unwrap(), 3);

        let desc: Vec<f64> = storage.list_all().unwrap().iter().map(|r| r.value).collect();
        assert_eq!(desc, vec![120.0, 110.0, 100.0]);

        let asc = storage.list_ascending().unwrap();
        assert_eq!(asc[0].event, Some(EventType::Meal));
        assert_eq!(asc[0].timestamp, reading(0, 0.0, None).timestamp);
        assert!(asc.iter().all(|r| r.id.is_some()));
    }

    #[test]
    fn test_values_are_single_precision() {
        let storage = Storage::in_memory().unwrap();
        storage.append(&reading(0, 123.456789, None)).unwrap();
        let stored = storage.list_all().unwrap()[0].value;
        assert_eq!(stored, f64::from(123.456789_f32));
    }

    #[test]
    fn test_unknown_event_tag_reads_as_untagged() {
        let storage = Storage::in_memory().unwrap();
        let when = reading(0, 0.0, None).epoch_millis();
        storage
            .conn
            .execute(
                "INSERT INTO glucose_history (timestamp, value, event_type) VALUES (?1, ?2, 'SNACK')",
                params![when, 118.0],
            )
            .unwrap();

        let all = storage.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, 118.0);
        assert!(all[0].event.is_none());
    }

    #[test]
    fn test_bulk_import() {
        let mut storage = Storage::in_memory().unwrap();
        let readings: Vec<Reading> = (0..50).map(|i| reading(i, 90.0 + i as f64, None)).collect();
        assert_eq!(storage.import_readings(&readings).unwrap(), 50);
        assert_eq!(storage.count().unwrap(), 50);
        assert_eq!(storage.list_all().unwrap()[0].value, 139.0);
    }

    #[test]
    fn test_clear_event_tag_keeps_identity() {
        let storage = Storage::in_memory().unwrap();
        let id = storage.append(&reading(0, 140.0, Some(EventType::Insulin))).unwrap();

        assert!(storage.clear_event_tag(id).unwrap());
        let all = storage.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, Some(id));
        assert_eq!(all[0].value, 140.0);
        assert!(all[0].event.is_none());

        assert!(!storage.clear_event_tag(id + 100).unwrap());
    }

    #[test]
    fn test_background_writer_flushes_on_shutdown() {
        let path = std::env::temp_dir().join(format!(
            "glucotrack_writer_{}_{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or(0)
        ));

        let writer = BackgroundWriter::spawn(path.clone()).unwrap();
        for i in 0..25 {
            writer.append(reading(i, 100.0 + i as f64, None));
        }
        assert_eq!(writer.shutdown(), 25);

        let storage = Storage::new(&path).unwrap();
        assert_eq!(storage.count().unwrap(), 25);
        drop(storage);
        let _ = std::fs::remove_file(&path);
    }
}
