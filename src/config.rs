//! Configuration module for kumasync.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Hard cap on the important-heartbeat (event log) list.
pub const MAX_IMPORTANT_LIST_LIMIT: u32 = 500;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 3001)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "kuma.db")
    pub db_path: String,
    /// Number of recent heartbeats sent in a ticker list (default: 1)
    pub heartbeat_list_limit: u32,
    /// Number of important heartbeats sent in an event list (default: 500)
    pub important_list_limit: u32,
    /// Omit version details from the server info event
    pub hide_version: bool,
    /// Whether the process runs inside a container
    pub is_container: bool,
    /// Timezone name reported to clients
    pub timezone: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 3001,
            db_path: "kuma.db".to_string(),
            heartbeat_list_limit: 1,
            important_list_limit: MAX_IMPORTANT_LIST_LIMIT,
            hide_version: false,
            is_container: false,
            timezone: "UTC".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `KUMASYNC_HTTP_PORT`: HTTP port (default: 3001)
    /// - `KUMASYNC_DB_PATH`: Database file path (default: "kuma.db")
    /// - `KUMASYNC_HEARTBEAT_LIST_LIMIT`: ticker list size, at least 1 (default: 1)
    /// - `KUMASYNC_IMPORTANT_LIST_LIMIT`: event list size, clamped to 500 (default: 500)
    /// - `KUMASYNC_HIDE_VERSION`: `1` or `true` hides version info
    /// - `KUMASYNC_IS_CONTAINER`: `1` marks a container deployment
    /// - `TZ`: server timezone name (default: "UTC")
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = lookup("KUMASYNC_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("KUMASYNC_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(limit) = lookup("KUMASYNC_HEARTBEAT_LIST_LIMIT").and_then(|s| s.parse::<u32>().ok())
        {
            if limit > 0 {
                cfg.heartbeat_list_limit = limit;
            }
        }

        if let Some(limit) = lookup("KUMASYNC_IMPORTANT_LIST_LIMIT").and_then(|s| s.parse::<u32>().ok())
        {
            if limit > 0 {
                cfg.important_list_limit = limit.min(MAX_IMPORTANT_LIST_LIMIT);
            }
        }

        if let Some(v) = lookup("KUMASYNC_HIDE_VERSION") {
            cfg.hide_version = v == "1" || v.eq_ignore_ascii_case("true");
        }

        if let Some(v) = lookup("KUMASYNC_IS_CONTAINER") {
            cfg.is_container = v == "1";
        }

        if let Some(tz) = lookup("TZ").filter(|s| !s.is_empty()) {
            cfg.timezone = tz;
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 3001);
        assert_eq!(cfg.db_path, "kuma.db");
        assert_eq!(cfg.heartbeat_list_limit, 1);
        assert_eq!(cfg.important_list_limit, 500);
        assert!(!cfg.hide_version);
    }

    #[test]
    fn test_overrides() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("KUMASYNC_HTTP_PORT", "8081"),
            ("KUMASYNC_HEARTBEAT_LIST_LIMIT", "100"),
            ("KUMASYNC_HIDE_VERSION", "true"),
            ("TZ", "Europe/Berlin"),
        ]));
        assert_eq!(cfg.http_port, 8081);
        assert_eq!(cfg.heartbeat_list_limit, 100);
        assert!(cfg.hide_version);
        assert_eq!(cfg.timezone, "Europe/Berlin");
    }

    #[test]
    fn test_invalid_limits_keep_defaults() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("KUMASYNC_HEARTBEAT_LIST_LIMIT", "0"),
            ("KUMASYNC_IMPORTANT_LIST_LIMIT", "lots"),
            ("KUMASYNC_HTTP_PORT", "not-a-port"),
        ]));
        assert_eq!(cfg.heartbeat_list_limit, 1);
        assert_eq!(cfg.important_list_limit, 500);
        assert_eq!(cfg.http_port, 3001);
    }

    #[test]
    fn test_important_limit_is_clamped() {
        let cfg =
            ServerConfig::from_lookup(lookup_from(&[("KUMASYNC_IMPORTANT_LIST_LIMIT", "10000")]));
        assert_eq!(cfg.important_list_limit, MAX_IMPORTANT_LIST_LIMIT);
    }
}
