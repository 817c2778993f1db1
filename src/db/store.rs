//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Which heartbeats to read.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatFilter {
    /// Latest `limit` heartbeats of a monitor, newest first.
    Recent { monitor_id: i64, limit: u32 },
    /// Latest `limit` important heartbeats of a monitor, newest first.
    Important { monitor_id: i64, limit: u32 },
    /// Every heartbeat of the account's monitors with `start <= time <= end`, oldest first.
    AccountRange {
        account_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Read-only query interface over stored heartbeats.
pub trait HeartbeatStore: Send + Sync {
    fn query(&self, filter: &HeartbeatFilter) -> Result<Vec<Heartbeat>, DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Heartbeats ---

    /// Latest heartbeats of a monitor, newest first.
    pub fn get_recent_heartbeats(
        &self,
        monitor_id: i64,
        limit: u32,
    ) -> Result<Vec<Heartbeat>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, status, important, msg, ping, time FROM heartbeat
             WHERE monitor_id = ?1 ORDER BY time DESC, id DESC LIMIT ?2",
        )?;
        let beats = stmt
            .query_map(params![monitor_id, limit], heartbeat_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(beats)
    }

    /// Latest important heartbeats of a monitor, newest first.
    pub fn get_important_heartbeats(
        &self,
        monitor_id: i64,
        limit: u32,
    ) -> Result<Vec<Heartbeat>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, status, important, msg, ping, time FROM heartbeat
             WHERE monitor_id = ?1 AND important = 1 ORDER BY time DESC, id DESC LIMIT ?2",
        )?;
        let beats = stmt
            .query_map(params![monitor_id, limit], heartbeat_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(beats)
    }

    /// All heartbeats of an account's monitors inside an inclusive range, oldest first.
    ///
    /// SQLite narrows the rows on normalized times with a one second margin;
    /// the exact `start <= time <= end` cut and the ordering are applied to the
    /// parsed timestamps, so stored precision and layout never move a row
    /// across a window edge.
    pub fn get_account_heartbeats(
        &self,
        account_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT h.id, h.monitor_id, h.status, h.important, h.msg, h.ping, h.time
             FROM heartbeat h
             JOIN monitor m ON m.id = h.monitor_id
             WHERE m.user_id = ?1
               AND julianday(h.time) >= julianday(?2) - 1.0 / 86400
               AND julianday(h.time) <= julianday(?3) + 1.0 / 86400
             ORDER BY julianday(h.time) ASC, h.id ASC",
        )?;
        let mut beats = stmt
            .query_map(
                params![account_id, format_db_time(start), format_db_time(end)],
                heartbeat_from_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        beats.retain(|b| start <= b.time && b.time <= end);
        beats.sort_by_key(|b| (b.time, b.id));
        Ok(beats)
    }

    // --- Account lists ---

    /// Notification providers owned by an account.
    pub fn get_notifications(&self, user_id: i64) -> Result<Vec<Notification>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, config, active, is_default FROM notification WHERE user_id = ?1 ORDER BY id",
        )?;
        let list = stmt
            .query_map(params![user_id], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    config: row.get(3)?,
                    active: row.get(4)?,
                    is_default: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(list)
    }

    /// Proxies owned by an account.
    pub fn get_proxies(&self, user_id: i64) -> Result<Vec<Proxy>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, protocol, host, port, auth, username, password, active, is_default, created_date
             FROM proxy WHERE user_id = ?1 ORDER BY id",
        )?;
        let list = stmt
            .query_map(params![user_id], |row| {
                Ok(Proxy {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    protocol: row.get(2)?,
                    host: row.get(3)?,
                    port: row.get(4)?,
                    auth: row.get(5)?,
                    username: row.get(6)?,
                    password: row.get(7)?,
                    active: row.get(8)?,
                    is_default: row.get(9)?,
                    created_date: row.get(10)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(list)
    }

    /// API keys owned by an account.
    pub fn get_api_keys(&self, user_id: i64) -> Result<Vec<ApiKey>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, key, active, created_date, expires FROM api_key WHERE user_id = ?1 ORDER BY id",
        )?;
        let list = stmt
            .query_map(params![user_id], |row| {
                Ok(ApiKey {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    key: row.get(3)?,
                    active: row.get(4)?,
                    created_date: row.get(5)?,
                    expires: row.get(6)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(list)
    }

    /// Docker hosts owned by an account.
    pub fn get_docker_hosts(&self, user_id: i64) -> Result<Vec<DockerHost>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, docker_type, docker_daemon FROM docker_host WHERE user_id = ?1 ORDER BY id",
        )?;
        let list = stmt
            .query_map(params![user_id], |row| {
                Ok(DockerHost {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    docker_type: row.get(3)?,
                    docker_daemon: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(list)
    }

    // --- Settings ---

    /// Get a global setting value, if set.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let value: Option<Option<String>> = conn
            .query_row("SELECT value FROM setting WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.flatten())
    }
}

impl HeartbeatStore for Store {
    fn query(&self, filter: &HeartbeatFilter) -> Result<Vec<Heartbeat>, DbError> {
        match *filter {
            HeartbeatFilter::Recent { monitor_id, limit } => {
                self.get_recent_heartbeats(monitor_id, limit)
            }
            HeartbeatFilter::Important { monitor_id, limit } => {
                self.get_important_heartbeats(monitor_id, limit)
            }
            HeartbeatFilter::AccountRange { account_id, start, end } => {
                self.get_account_heartbeats(account_id, start, end)
            }
        }
    }
}

fn heartbeat_from_row(row: &Row<'_>) -> SqlResult<Heartbeat> {
    let raw_status: u8 = row.get(2)?;
    let status = Status::try_from(raw_status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Integer, e.into()))?;

    let time_str: String = row.get(6)?;
    let time = parse_db_time(&time_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Text,
            format!("invalid heartbeat time {:?}", time_str).into(),
        )
    })?;

    Ok(Heartbeat {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        status,
        important: row.get(3)?,
        msg: row.get(4)?,
        ping: row.get(5)?,
        time,
    })
}

/// Format a timestamp the way heartbeat times are stored.
pub fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
pub fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
impl Store {
    pub fn add_monitor(&self, user_id: i64, name: &str) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO monitor (user_id, name) VALUES (?1, ?2)", params![user_id, name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_heartbeat(
        &self,
        monitor_id: i64,
        status: Status,
        important: bool,
        time: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO heartbeat (monitor_id, status, important, msg, ping, time) VALUES (?1, ?2, ?3, '', NULL, ?4)",
            params![monitor_id, u8::from(status), important, format_db_time(time)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn execute_raw(&self, sql: &str) -> Result<(), DbError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }
}
