use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// One stored sensor sample. Immutable once written.
#[derive(Debug, Clone)]
pub struct Reading {
    pub id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sensor store db error: {0}")]
    Db(String),
    #[error("{0}")]
    InvalidValue(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

/// SQLite-backed reading and threshold stores sharing one connection.
/// The mutex is the only in-process serialization and is never held
/// across an await point.
#[derive(Clone)]
pub struct SensorStore {
    connection: Arc<Mutex<Connection>>,
}

impl SensorStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists. The threshold row is seeded with `default_threshold`
    /// so a fresh database already answers `threshold()`.
    pub fn open(path: &Path, default_threshold: f64) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?, default_threshold)
    }

    /// In-memory store for tests.
    pub fn open_in_memory(default_threshold: f64) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, default_threshold)
    }

    fn from_connection(connection: Connection, default_threshold: f64) -> Result<Self, StoreError> {
        if !default_threshold.is_finite() {
            return Err(StoreError::InvalidValue(
                "default threshold must be finite".into(),
            ));
        }
        connection.execute_batch("PRAGMA journal_mode = wal;")?;
        connection.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                temperature REAL NOT NULL,
                humidity REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings (timestamp);
            CREATE TABLE IF NOT EXISTS threshold (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                value REAL NOT NULL
            );",
        )?;
        connection.execute(
            "INSERT OR IGNORE INTO threshold (id, value) VALUES (1, ?1)",
            params![default_threshold],
        )?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Db("store mutex poisoned".into()))
    }

    /// Appends a reading, assigning the id and the write-time UTC
    /// timestamp. Timestamps are stored at millisecond precision.
    pub fn append_reading(
        &self,
        device_id: &str,
        temperature: f64,
        humidity: f64,
    ) -> Result<Reading, StoreError> {
        let now = Utc::now();
        let timestamp = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO readings (device_id, timestamp, temperature, humidity)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                device_id,
                timestamp.timestamp_millis(),
                temperature,
                humidity
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Reading {
            id,
            device_id: device_id.to_string(),
            timestamp,
            temperature,
            humidity,
        })
    }

    /// Readings with timestamp >= `cutoff` (all readings when `None`),
    /// ordered by id ascending.
    pub fn readings_since(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Reading>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, device_id, timestamp, temperature, humidity FROM readings
             WHERE timestamp >= ?1 ORDER BY id ASC",
        )?;
        let cutoff_millis = cutoff.map_or(i64::MIN, |c| c.timestamp_millis());
        let rows = stmt.query_map(params![cutoff_millis], map_reading_row)?;
        rows.map(|row| row.map_err(StoreError::from).and_then(build_reading))
            .collect()
    }

    pub fn all_readings(&self) -> Result<Vec<Reading>, StoreError> {
        self.readings_since(None)
    }

    pub fn threshold(&self) -> Result<f64, StoreError> {
        let conn = self.lock()?;
        let value: Option<f64> = conn
            .query_row("SELECT value FROM threshold WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        value.ok_or_else(|| StoreError::Db("threshold row missing".into()))
    }

    /// Replaces the threshold. Concurrent sets race last-write-wins.
    pub fn set_threshold(&self, value: f64) -> Result<f64, StoreError> {
        if !value.is_finite() {
            return Err(StoreError::InvalidValue("threshold must be finite".into()));
        }
        let conn = self.lock()?;
        conn.execute("UPDATE threshold SET value = ?1 WHERE id = 1", params![value])?;
        Ok(value)
    }
}

struct ReadingRow {
    id: i64,
    device_id: String,
    timestamp_millis: i64,
    temperature: f64,
    humidity: f64,
}

fn map_reading_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReadingRow> {
    Ok(ReadingRow {
        id: row.get(0)?,
        device_id: row.get(1)?,
        timestamp_millis: row.get(2)?,
        temperature: row.get(3)?,
        humidity: row.get(4)?,
    })
}

fn build_reading(row: ReadingRow) -> Result<Reading, StoreError> {
    let timestamp = DateTime::from_timestamp_millis(row.timestamp_millis)
        .ok_or_else(|| StoreError::Db(format!("invalid stored timestamp for id {}", row.id)))?;
    Ok(Reading {
        id: row.id,
        device_id: row.device_id,
        timestamp,
        temperature: row.temperature,
        humidity: row.humidity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SensorStore {
        SensorStore::open_in_memory(30.0).unwrap()
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let store = store();
        let a = store.append_reading("sensor-1", 20.0, 50.0).unwrap();
        let b = store.append_reading("sensor-2", 21.0, 51.0).unwrap();
        let c = store.append_reading("sensor-1", 22.0, 52.0).unwrap();
        assert!(a.id < b.id && b.id < c.id);

        let all = store.all_readings().unwrap();
        let ids: Vec<i64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(all[0].temperature, 20.0);
        assert_eq!(all[2].humidity, 52.0);
    }

    #[test]
    fn append_is_immediately_visible() {
        let store = store();
        let written = store.append_reading("sensor-1", 19.5, 61.2).unwrap();
        let all = store.all_readings().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, written.id);
        assert_eq!(all[0].device_id, "sensor-1");
        assert_eq!(all[0].temperature, 19.5);
        assert_eq!(all[0].humidity, 61.2);
        assert_eq!(all[0].timestamp, written.timestamp);
    }

    #[test]
    fn readings_since_filters_by_cutoff() {
        let store = store();
        store.append_reading("sensor-1", 20.0, 50.0).unwrap();
        let future = Utc::now() + Duration::hours(1);
        assert!(store.readings_since(Some(future)).unwrap().is_empty());
        let past = Utc::now() - Duration::hours(1);
        assert_eq!(store.readings_since(Some(past)).unwrap().len(), 1);
    }

    #[test]
    fn threshold_defaults_then_updates() {
        let store = store();
        assert_eq!(store.threshold().unwrap(), 30.0);
        assert_eq!(store.set_threshold(25.5).unwrap(), 25.5);
        assert_eq!(store.threshold().unwrap(), 25.5);
    }

    #[test]
    fn threshold_rejects_non_finite() {
        let store = store();
        assert!(matches!(
            store.set_threshold(f64::NAN),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            store.set_threshold(f64::INFINITY),
            Err(StoreError::InvalidValue(_))
        ));
        // the stored value is untouched
        assert_eq!(store.threshold().unwrap(), 30.0);
    }

    #[test]
    fn threshold_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.db");
        {
            let store = SensorStore::open(&path, 30.0).unwrap();
            store.set_threshold(27.0).unwrap();
            store.append_reading("sensor-1", 20.0, 50.0).unwrap();
        }
        let reopened = SensorStore::open(&path, 30.0).unwrap();
        // the seed does not clobber the committed value
        assert_eq!(reopened.threshold().unwrap(), 27.0);
        assert_eq!(reopened.all_readings().unwrap().len(), 1);
    }
}
