//! HTTP and WebSocket request handlers.

use super::AppState;
use crate::broadcast::BroadcastError;
use crate::session::Session;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;

// ============================================================================
// WebSocket sessions
// ============================================================================

/// A request sent by a connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientRequest {
    #[serde(rename_all = "camelCase")]
    HeartbeatList {
        monitor_id: i64,
        #[serde(default)]
        to_user: bool,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename_all = "camelCase")]
    ImportantHeartbeatList {
        monitor_id: i64,
        #[serde(default)]
        to_user: bool,
        #[serde(default)]
        overwrite: bool,
    },
    DowntimeStats {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    NotificationList,
    ProxyList,
    ApiKeyList,
    DockerHostList,
    Info,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Account the connection was authenticated as upstream.
    pub account_id: i64,
}

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state, query.account_id))
}

async fn run_session(mut socket: WebSocket, state: AppState, account_id: i64) {
    let (session, mut outbound) = state.router.register(account_id).await;
    tracing::info!(
        "Session {} connected for account {} ({} live)",
        session.id(),
        account_id,
        state.router.session_count(account_id).await
    );

    if let Err(e) = state.lists.send_info(&session).await {
        tracing::error!("Session {}: failed to send info: {}", session.id(), e);
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientRequest>(text.as_str()) {
                        Ok(request) => {
                            tokio::spawn(dispatch_logged(state.clone(), session.clone(), request));
                        }
                        Err(e) => {
                            tracing::warn!("Session {}: ignoring malformed request: {}", session.id(), e)
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Session {}: socket error: {}", session.id(), e);
                    break;
                }
            },
            Some(event) = outbound.recv() => {
                let frame = match serde_json::to_string(&event) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::error!(
                            "Session {}: failed to encode {}: {}",
                            session.id(),
                            event.event,
                            e
                        );
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.router.unregister(&session).await;
    tracing::info!("Session {} disconnected", session.id());
}

async fn dispatch_logged(state: AppState, session: Session, request: ClientRequest) {
    if let Err(e) = dispatch(&state, &session, &request).await {
        tracing::error!("Session {}: {:?} failed: {}", session.id(), request, e);
    }
}

/// Run one client request. Returns how many sessions received the reply.
pub async fn dispatch(
    state: &AppState,
    session: &Session,
    request: &ClientRequest,
) -> Result<usize, BroadcastError> {
    match *request {
        ClientRequest::HeartbeatList {
            monitor_id,
            to_user,
            overwrite,
        } => {
            state
                .broadcaster
                .send_heartbeat_list(session, monitor_id, to_user, overwrite)
                .await
        }
        ClientRequest::ImportantHeartbeatList {
            monitor_id,
            to_user,
            overwrite,
        } => {
            state
                .broadcaster
                .send_important_heartbeat_list(session, monitor_id, to_user, overwrite)
                .await
        }
        ClientRequest::DowntimeStats { start, end } => {
            state.broadcaster.send_downtime_stats(session, start, end).await
        }
        ClientRequest::NotificationList => state.lists.send_notification_list(session).await,
        ClientRequest::ProxyList => state.lists.send_proxy_list(session).await,
        ClientRequest::ApiKeyList => state.lists.send_api_key_list(session).await,
        ClientRequest::DockerHostList => state.lists.send_docker_host_list(session).await,
        ClientRequest::Info => state.lists.send_info(session).await,
    }
}

// ============================================================================
// API: Downtime
// ============================================================================

impl From<&BroadcastError> for StatusCode {
    fn from(err: &BroadcastError) -> Self {
        match err {
            BroadcastError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            BroadcastError::DataAccess(_) | BroadcastError::Encode(_) | BroadcastError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DowntimeQuery {
    pub account_id: i64,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| format!("invalid time {:?}: {}", s, e)),
    }
}

pub async fn handle_get_downtime(
    State(state): State<AppState>,
    Query(query): Query<DowntimeQuery>,
) -> impl IntoResponse {
    let end = match parse_time(query.end.as_deref()) {
        Ok(t) => t.unwrap_or_else(Utc::now),
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    let start = match parse_time(query.start.as_deref()) {
        Ok(t) => t.unwrap_or_else(|| end - ChronoDuration::hours(24)),
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    match state.broadcaster.downtime_stats(query.account_id, start, end).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!("Downtime stats for account {} failed: {}", query.account_id, e);
            (StatusCode::from(&e), e.to_string()).into_response()
        }
    }
}

pub async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
