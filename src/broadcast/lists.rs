//! Per-account settings lists and server info.
//!
//! Each list is fetched for the session's account, projected to its public
//! form and sent to every session of that account.

use super::BroadcastError;
use crate::config::ServerConfig;
use crate::db::{ApiKey, DbError, DockerHost, Notification, Proxy, Store};
use crate::session::{OutboundEvent, Session, SessionRouter};

use chrono::Local;
use serde::Serialize;
use std::sync::Arc;

pub const EVENT_NOTIFICATION_LIST: &str = "notificationList";
pub const EVENT_PROXY_LIST: &str = "proxyList";
pub const EVENT_API_KEY_LIST: &str = "apiKeyList";
pub const EVENT_DOCKER_HOST_LIST: &str = "dockerHostList";
pub const EVENT_INFO: &str = "info";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationInfo {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub config: String,
    pub active: bool,
    pub is_default: bool,
}

impl From<Notification> for NotificationInfo {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            name: n.name,
            config: n.config,
            active: n.active,
            is_default: n.is_default,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfo {
    pub id: i64,
    pub user_id: i64,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub auth: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub active: bool,
    pub default: bool,
    pub created_date: String,
}

impl From<Proxy> for ProxyInfo {
    fn from(p: Proxy) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            protocol: p.protocol,
            host: p.host,
            port: p.port,
            auth: p.auth,
            username: p.username,
            password: p.password,
            active: p.active,
            default: p.is_default,
            created_date: p.created_date,
        }
    }
}

/// Public API key form: the stored key hash never leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyInfo {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub active: bool,
    pub created_date: String,
    pub expires: Option<String>,
}

impl From<ApiKey> for ApiKeyInfo {
    fn from(k: ApiKey) -> Self {
        Self {
            id: k.id,
            user_id: k.user_id,
            name: k.name,
            active: k.active,
            created_date: k.created_date,
            expires: k.expires,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerHostInfo {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub docker_type: String,
    pub docker_daemon: String,
}

impl From<DockerHost> for DockerHostInfo {
    fn from(d: DockerHost) -> Self {
        Self {
            id: d.id,
            user_id: d.user_id,
            name: d.name,
            docker_type: d.docker_type,
            docker_daemon: d.docker_daemon,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_container: Option<bool>,
    #[serde(rename = "primaryBaseURL")]
    pub primary_base_url: Option<String>,
    pub server_timezone: String,
    pub server_timezone_offset: String,
}

/// Sends account-scoped settings lists and server info.
#[derive(Clone)]
pub struct AccountLists {
    store: Arc<Store>,
    router: Arc<SessionRouter>,
    config: ServerConfig,
}

impl AccountLists {
    pub fn new(store: Arc<Store>, router: Arc<SessionRouter>, config: ServerConfig) -> Self {
        Self { store, router, config }
    }

    async fn emit_list<T: Serialize>(
        &self,
        session: &Session,
        event: &str,
        list: Vec<T>,
    ) -> Result<usize, BroadcastError> {
        let payload = serde_json::to_value(&list)?;
        let delivered = self
            .router
            .emit_to_account(session.account_id(), OutboundEvent::new(event, vec![payload]))
            .await;
        tracing::debug!("Sent {} ({} rows) to account {}", event, list.len(), session.account_id());
        Ok(delivered)
    }

    async fn fetch<T, F>(&self, query: F) -> Result<Vec<T>, BroadcastError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<Vec<T>, DbError> + Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || query(store.as_ref())).await??)
    }

    pub async fn send_notification_list(&self, session: &Session) -> Result<usize, BroadcastError> {
        let user_id = session.account_id();
        let list = self.fetch(move |s| s.get_notifications(user_id)).await?;
        let list: Vec<NotificationInfo> = list.into_iter().map(Into::into).collect();
        self.emit_list(session, EVENT_NOTIFICATION_LIST, list).await
    }

    pub async fn send_proxy_list(&self, session: &Session) -> Result<usize, BroadcastError> {
        let user_id = session.account_id();
        let list = self.fetch(move |s| s.get_proxies(user_id)).await?;
        let list: Vec<ProxyInfo> = list.into_iter().map(Into::into).collect();
        self.emit_list(session, EVENT_PROXY_LIST, list).await
    }

    pub async fn send_api_key_list(&self, session: &Session) -> Result<usize, BroadcastError> {
        let user_id = session.account_id();
        let list = self.fetch(move |s| s.get_api_keys(user_id)).await?;
        let list: Vec<ApiKeyInfo> = list.into_iter().map(Into::into).collect();
        self.emit_list(session, EVENT_API_KEY_LIST, list).await
    }

    pub async fn send_docker_host_list(&self, session: &Session) -> Result<usize, BroadcastError> {
        let user_id = session.account_id();
        let list = self.fetch(move |s| s.get_docker_hosts(user_id)).await?;
        let list: Vec<DockerHostInfo> = list.into_iter().map(Into::into).collect();
        self.emit_list(session, EVENT_DOCKER_HOST_LIST, list).await
    }

    /// Send server info to the requesting session only.
    pub async fn send_info(&self, session: &Session) -> Result<usize, BroadcastError> {
        let store = self.store.clone();
        let primary_base_url =
            tokio::task::spawn_blocking(move || store.get_setting("primaryBaseURL")).await??;

        let (version, is_container) = if self.config.hide_version {
            (None, None)
        } else {
            (Some(env!("CARGO_PKG_VERSION").to_string()), Some(self.config.is_container))
        };

        let info = ServerInfo {
            version,
            latest_version: None,
            is_container,
            primary_base_url,
            server_timezone: self.config.timezone.clone(),
            server_timezone_offset: Local::now().offset().to_string(),
        };

        let event = OutboundEvent::new(EVENT_INFO, vec![serde_json::to_value(&info)?]);
        Ok(usize::from(self.router.emit_to_session(session, event).await))
    }
}
