//! SQLite-backed detection store.

use std::path::Path;
use std::sync::{mpsc, Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::detection::{Detection, DetectionList};
use crate::error::{StoreError, StoreResult};
use crate::observable::Observable;
use crate::observation::RadioKind;
use crate::store::{DetectionStore, SettingsStore};

const SELECT_COLUMNS: &str = "id, kind, mac_address, name, service_uuids, rssi, observed_at, \
     latitude, longitude, threat_level, reason, timestamp";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    saved: Observable<DetectionList>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        log::info!("Opened detection database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        let initial = query_all(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            saved: Observable::new(Arc::new(initial)),
        })
    }

    fn publish(&self, conn: &Connection) -> StoreResult<()> {
        self.saved.set(Arc::new(query_all(conn)?));
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS detections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            mac_address TEXT NOT NULL,
            name TEXT,
            service_uuids TEXT NOT NULL DEFAULT '[]',
            rssi INTEGER NOT NULL,
            observed_at TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            threat_level INTEGER NOT NULL,
            reason TEXT,
            timestamp TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_detections_mac_address
            ON detections(mac_address);
        CREATE INDEX IF NOT EXISTS idx_detections_timestamp
            ON detections(timestamp);
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(column: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("{column} '{raw}': {e}")))
}

/// Row as stored, before decoding into a [`Detection`].
struct DetectionRow {
    id: i64,
    kind: String,
    mac_address: String,
    name: Option<String>,
    service_uuids: String,
    rssi: i32,
    observed_at: String,
    latitude: f64,
    longitude: f64,
    threat_level: u8,
    reason: Option<String>,
    timestamp: String,
}

impl DetectionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            mac_address: row.get(2)?,
            name: row.get(3)?,
            service_uuids: row.get(4)?,
            rssi: row.get(5)?,
            observed_at: row.get(6)?,
            latitude: row.get(7)?,
            longitude: row.get(8)?,
            threat_level: row.get(9)?,
            reason: row.get(10)?,
            timestamp: row.get(11)?,
        })
    }

    fn decode(self) -> StoreResult<Detection> {
        let kind = RadioKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Decode(format!("unknown radio kind '{}'", self.kind)))?;
        Ok(Detection {
            id: Some(self.id),
            kind,
            hardware_address: self.mac_address,
            display_name: self.name,
            service_identifiers: serde_json::from_str(&self.service_uuids)?,
            signal_strength: self.rssi,
            observed_at: parse_time("observed_at", &self.observed_at)?,
            latitude: self.latitude,
            longitude: self.longitude,
            threat_level: self.threat_level,
            reason: self.reason,
            timestamp: parse_time("timestamp", &self.timestamp)?,
        })
    }
}

fn query_all(conn: &Connection) -> StoreResult<Vec<Detection>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM detections ORDER BY timestamp DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map([], DetectionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(DetectionRow::decode).collect()
}

impl DetectionStore for SqliteStore {
    fn insert_or_replace(&self, detection: &Detection) -> StoreResult<i64> {
        let conn = self.conn.lock();
        let uuids = serde_json::to_string(&detection.service_identifiers)?;
        conn.execute(
            "INSERT OR REPLACE INTO detections
             (id, kind, mac_address, name, service_uuids, rssi, observed_at,
              latitude, longitude, threat_level, reason, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                detection.id,
                detection.kind.as_str(),
                detection.hardware_address,
                detection.display_name,
                uuids,
                detection.signal_strength,
                format_time(&detection.observed_at),
                detection.latitude,
                detection.longitude,
                detection.threat_level,
                detection.reason,
                format_time(&detection.timestamp),
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.publish(&conn)?;
        Ok(id)
    }

    fn delete_all(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM detections", [])?;
        log::info!("Cleared {removed} saved detection(s)");
        self.publish(&conn)
    }

    fn delete(&self, detection: &Detection) -> StoreResult<bool> {
        let Some(id) = detection.id else {
            return Ok(false);
        };
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM detections WHERE id = ?1", params![id])? > 0;
        if removed {
            self.publish(&conn)?;
        }
        Ok(removed)
    }

    fn find_by_address(&self, address: &str) -> StoreResult<Option<Detection>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM detections WHERE mac_address = ?1"),
                params![address],
                DetectionRow::from_row,
            )
            .optional()?;
        row.map(DetectionRow::decode).transpose()
    }

    fn all_newest_first(&self) -> StoreResult<Vec<Detection>> {
        query_all(&self.conn.lock())
    }

    fn subscribe(&self) -> mpsc::Receiver<DetectionList> {
        self.saved.subscribe()
    }
}

impl SettingsStore for SqliteStore {
    fn get_setting(&self, key: &str) -> StoreResult<Option<Value>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_setting(&self, key: &str, value: &Value) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }
}
