//! Heartbeat delivery to connected clients.
//!
//! Every operation either assembles its whole payload and emits it once, or
//! fails and emits nothing.

mod lists;

pub use lists::*;

use crate::config::ServerConfig;
use crate::db::{DbError, Heartbeat, HeartbeatFilter, HeartbeatStore};
use crate::downtime::{AnalyzeError, DowntimeAnalyzer, DowntimeReport, TimeRange};
use crate::session::{DeliveryScope, OutboundEvent, Session, SessionRouter};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const EVENT_HEARTBEAT_LIST: &str = "heartbeatList";
pub const EVENT_IMPORTANT_HEARTBEAT_LIST: &str = "importantHeartbeatList";
pub const EVENT_DOWNTIME_STATS: &str = "sendDownTimeStats";

/// Broadcast error types.
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("data access failed: {0}")]
    DataAccess(#[from] DbError),
    #[error("malformed input: {0}")]
    MalformedInput(#[from] AnalyzeError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Row limits for the heartbeat lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    /// Recent heartbeats per ticker list.
    pub heartbeat_list: u32,
    /// Important heartbeats per event list.
    pub important_list: u32,
}

impl From<&ServerConfig> for ListLimits {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            heartbeat_list: cfg.heartbeat_list_limit,
            important_list: cfg.important_list_limit,
        }
    }
}

/// Pushes heartbeat lists and downtime statistics to sessions.
#[derive(Clone)]
pub struct HeartbeatBroadcaster {
    store: Arc<dyn HeartbeatStore>,
    router: Arc<SessionRouter>,
    analyzer: DowntimeAnalyzer,
    limits: ListLimits,
}

impl HeartbeatBroadcaster {
    pub fn new(
        store: Arc<dyn HeartbeatStore>,
        router: Arc<SessionRouter>,
        limits: ListLimits,
    ) -> Self {
        Self {
            store,
            router,
            analyzer: DowntimeAnalyzer::new(),
            limits,
        }
    }

    /// Run a store query off the async runtime.
    async fn fetch(&self, filter: HeartbeatFilter) -> Result<Vec<Heartbeat>, BroadcastError> {
        let store = self.store.clone();
        let beats = tokio::task::spawn_blocking(move || store.query(&filter)).await??;
        Ok(beats)
    }

    /// Send the most recent heartbeats of a monitor, oldest first.
    ///
    /// `to_user` sends to every session of the account instead of only the
    /// requester; `overwrite` tells the client to replace its cached list.
    pub async fn send_heartbeat_list(
        &self,
        session: &Session,
        monitor_id: i64,
        to_user: bool,
        overwrite: bool,
    ) -> Result<usize, BroadcastError> {
        let started = Instant::now();

        let mut beats = self
            .fetch(HeartbeatFilter::Recent {
                monitor_id,
                limit: self.limits.heartbeat_list,
            })
            .await?;
        beats.reverse();

        let event = list_event(EVENT_HEARTBEAT_LIST, monitor_id, &beats, overwrite)?;
        let delivered = self
            .router
            .deliver(session, DeliveryScope::from_to_user(to_user), event)
            .await;

        tracing::debug!("[Monitor: {}] sendHeartbeatList took {:?}", monitor_id, started.elapsed());
        Ok(delivered)
    }

    /// Send the important heartbeats (event log) of a monitor, newest first.
    pub async fn send_important_heartbeat_list(
        &self,
        session: &Session,
        monitor_id: i64,
        to_user: bool,
        overwrite: bool,
    ) -> Result<usize, BroadcastError> {
        let started = Instant::now();

        let beats = self
            .fetch(HeartbeatFilter::Important {
                monitor_id,
                limit: self.limits.important_list,
            })
            .await?;

        let event = list_event(EVENT_IMPORTANT_HEARTBEAT_LIST, monitor_id, &beats, overwrite)?;
        let delivered = self
            .router
            .deliver(session, DeliveryScope::from_to_user(to_user), event)
            .await;

        tracing::debug!(
            "[Monitor: {}] sendImportantHeartbeatList took {:?}",
            monitor_id,
            started.elapsed()
        );
        Ok(delivered)
    }

    /// Compute downtime statistics for every monitor of an account.
    pub async fn downtime_stats(
        &self,
        account_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DowntimeReport, BroadcastError> {
        let range = TimeRange::new(start, end)?;
        let beats = self
            .fetch(HeartbeatFilter::AccountRange {
                account_id,
                start: range.start(),
                end: range.end(),
            })
            .await?;
        Ok(self.analyzer.analyze(range, &beats)?)
    }

    /// Compute downtime statistics and send them to the requesting session.
    pub async fn send_downtime_stats(
        &self,
        session: &Session,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, BroadcastError> {
        let started = Instant::now();

        let report = self.downtime_stats(session.account_id(), start, end).await?;
        let event = OutboundEvent::new(EVENT_DOWNTIME_STATS, vec![serde_json::to_value(&report)?]);
        let delivered = usize::from(self.router.emit_to_session(session, event).await);

        tracing::debug!(
            "[Account: {}] sendDownTimeStats for {} monitor(s) took {:?}",
            session.account_id(),
            report.downtime_stats.len(),
            started.elapsed()
        );
        Ok(delivered)
    }
}

fn list_event(
    name: &str,
    monitor_id: i64,
    beats: &[Heartbeat],
    overwrite: bool,
) -> Result<OutboundEvent, BroadcastError> {
    let list: Value = serde_json::to_value(beats)?;
    Ok(OutboundEvent::new(name, vec![json!(monitor_id), list, json!(overwrite)]))
}
