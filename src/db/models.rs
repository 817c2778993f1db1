//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single heartbeat, stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    Down,
    Up,
    Pending,
    Maintenance,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Down => 0,
            Status::Up => 1,
            Status::Pending => 2,
            Status::Maintenance => 3,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Down),
            1 => Ok(Status::Up),
            2 => Ok(Status::Pending),
            3 => Ok(Status::Maintenance),
            other => Err(format!("unknown heartbeat status {}", other)),
        }
    }
}

/// One observed check result for a monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: i64,
    pub monitor_id: i64,
    pub status: Status,
    pub important: bool,
    pub msg: String,
    /// Response time in milliseconds, if the check measured one
    pub ping: Option<f64>,
    pub time: DateTime<Utc>,
}

/// A notification provider row.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub config: String,
    pub active: bool,
    pub is_default: bool,
}

/// A proxy row.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub id: i64,
    pub user_id: i64,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub auth: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub active: bool,
    pub is_default: bool,
    pub created_date: String,
}

/// An API key row. `key` holds the stored hash and is never sent to clients.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub key: String,
    pub active: bool,
    pub created_date: String,
    pub expires: Option<String>,
}

/// A docker host row.
#[derive(Debug, Clone)]
pub struct DockerHost {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub docker_type: String,
    pub docker_daemon: String,
}
