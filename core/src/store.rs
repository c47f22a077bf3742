//! SQLite result store
//!
//! Append-only log of committed measurements. Each logical operation opens
//! its own connection; SQLite's own locking serializes concurrent inserts.

use crate::error::StoreError;
use crate::model::{Measurement, MeasurementRecord};
use crate::TIMESTAMP_FORMAT;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "SELECT id, isp, server_name, server_country, server_distance,
        latency, download_speed, upload_speed, test_time
    FROM speedtest_results";

#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;

        // WAL lets the dashboard read while a cycle commits
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.busy_timeout(self.busy_timeout)?;

        Ok(conn)
    }

    /// Create the results table if it does not exist yet
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS speedtest_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                isp TEXT,
                server_name TEXT,
                server_country TEXT,
                server_distance REAL,
                latency INTEGER,
                download_speed REAL,
                upload_speed REAL,
                test_time TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_test_time ON speedtest_results(test_time)",
            [],
        )?;

        info!("Result store ready at {:?}", self.path);
        Ok(())
    }

    /// Insert one measurement, returning the assigned id
    pub fn insert(&self, m: &Measurement) -> Result<i64, StoreError> {
        let conn = self.connect()?;

        conn.execute(
            "INSERT INTO speedtest_results (
                isp, server_name, server_country, server_distance, latency,
                download_speed, upload_speed, test_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &m.isp,
                &m.server_name,
                &m.server_country,
                m.server_distance_km,
                m.latency_ms,
                m.download_mbps,
                m.upload_mbps,
                m.tested_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Stored measurement {}", id);
        Ok(id)
    }

    /// Insert and hand back the committed record
    pub fn commit(&self, measurement: Measurement) -> Result<MeasurementRecord, StoreError> {
        let id = self.insert(&measurement)?;
        Ok(MeasurementRecord { id, measurement })
    }

    /// Most recent `limit` records, newest first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<MeasurementRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY test_time DESC, id DESC LIMIT ?1"),
            params![limit],
        )
    }

    /// Every record, newest first
    pub fn list_all(&self) -> Result<Vec<MeasurementRecord>, StoreError> {
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY test_time DESC, id DESC"),
            [],
        )
    }

    pub fn latest(&self) -> Result<MeasurementRecord, StoreError> {
        self.list_recent(1)?.into_iter().next().ok_or(StoreError::NotFound)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM speedtest_results", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn query<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;

        let rows = stmt
            .query_map(params, StoredRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }
}

/// Row as read, with the timestamp still as stored text
struct StoredRow {
    id: i64,
    isp: Option<String>,
    server_name: Option<String>,
    server_country: Option<String>,
    server_distance: Option<f64>,
    latency: Option<u32>,
    download_speed: Option<f64>,
    upload_speed: Option<f64>,
    test_time: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            isp: row.get(1)?,
            server_name: row.get(2)?,
            server_country: row.get(3)?,
            server_distance: row.get(4)?,
            latency: row.get(5)?,
            download_speed: row.get(6)?,
            upload_speed: row.get(7)?,
            test_time: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<MeasurementRecord, StoreError> {
        Ok(MeasurementRecord {
            id: self.id,
            measurement: Measurement {
                isp: self.isp.unwrap_or_default(),
                server_name: self.server_name.unwrap_or_default(),
                server_country: self.server_country.unwrap_or_default(),
                server_distance_km: self.server_distance.unwrap_or_default(),
                latency_ms: self.latency,
                download_mbps: self.download_speed.unwrap_or_default(),
                upload_mbps: self.upload_speed.unwrap_or_default(),
                tested_at: parse_timestamp(&self.test_time)?,
            },
        })
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|e| {
        StoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}
