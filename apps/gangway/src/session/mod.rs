use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_SHELL: &str = "/bin/bash";

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    base_url: Url,
    deploy_prefix: Option<String>,
}

impl ConsoleConfig {
    pub fn new(console_base_url: impl AsRef<str>) -> Result<Self, SessionError> {
        // Centralized override so callers and env stay consistent.
        let mut base = std::env::var("GANGWAY_CONSOLE_BASE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| console_base_url.as_ref().trim().to_string());
        if base.is_empty() {
            return Err(SessionError::InvalidConfig(
                "console base url cannot be empty".into(),
            ));
        }
        if !base.contains("://") {
            let scheme = infer_scheme(&base);
            base = format!("{scheme}{base}");
        }
        let mut parsed = Url::parse(&base)
            .map_err(|err| SessionError::InvalidConfig(format!("invalid console url: {err}")))?;
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self {
            base_url: parsed,
            deploy_prefix: None,
        })
    }

    pub fn with_deploy_prefix(mut self, prefix: Option<String>) -> Self {
        self.deploy_prefix = prefix
            .map(|value| value.trim().trim_matches('/').to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn deploy_prefix(&self) -> Option<&str> {
        self.deploy_prefix.as_deref()
    }

    /// Address of the interactive terminal socket for one session. The
    /// websocket scheme follows the console's own scheme; the deploy prefix
    /// is an environment-specific routing segment in front of the terminal
    /// path.
    pub fn terminal_url(&self, session_id: &str) -> Result<Url, SessionError> {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            SessionError::InvalidConfig(format!(
                "cannot derive a websocket scheme from {}",
                self.base_url
            ))
        })?;
        let mut path = String::new();
        if let Some(prefix) = self.deploy_prefix.as_deref() {
            path.push('/');
            path.push_str(prefix);
        }
        path.push_str("/terminal/");
        path.push_str(session_id);
        url.set_path(&path);
        url.set_query(None);
        Ok(url)
    }
}

fn infer_scheme(base: &str) -> &'static str {
    let host = base
        .split('/')
        .next()
        .unwrap_or(base)
        .trim_start_matches('[')
        .split(']')
        .next()
        .unwrap_or(base)
        .to_ascii_lowercase();
    if is_private_host(&host) {
        "http://"
    } else {
        "https://"
    }
}

fn is_private_host(host: &str) -> bool {
    if host.starts_with("localhost") || host == "::1" || host == "0.0.0.0" {
        return true;
    }
    if host.starts_with("127.") || host.starts_with("10.") || host.starts_with("192.168.") {
        return true;
    }
    host.strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .map(|octet| (16..32).contains(&octet))
        .unwrap_or(false)
}

/// One server-issued remote shell handle. The transport borrows the id to
/// build its connection address; the session itself stays with the client
/// and is dropped on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    session_id: String,
    pod_name: Option<String>,
    container_name: Option<String>,
}

impl Session {
    /// A session known only by id, e.g. resumed from a persisted link.
    pub fn from_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pod_name: None,
            container_name: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn pod_name(&self) -> Option<&str> {
        self.pod_name.as_deref()
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    /// Truncated form used in banners and listings.
    pub fn short_id(&self) -> String {
        self.session_id.chars().take(8).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TerminalOptions {
    pub shell: String,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TerminalSessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub pod_name: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid console configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("console rejected request: {0}")]
    Server(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone)]
pub struct SessionManager {
    config: Arc<ConsoleConfig>,
    backend: Arc<dyn ConsoleBackend>,
}

impl SessionManager {
    pub fn new(config: ConsoleConfig) -> Result<Self, SessionError> {
        let backend = Arc::new(ReqwestConsoleBackend::new()?);
        Ok(Self {
            config: Arc::new(config),
            backend,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_backend(config: ConsoleConfig, backend: Arc<dyn ConsoleBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Request a fresh terminal session into the named workload. A response
    /// without a session id is a failed creation even when the console
    /// answers 200.
    pub async fn create(
        &self,
        target: &str,
        namespace: &str,
        options: &TerminalOptions,
    ) -> Result<Session, SessionError> {
        let request = CreateTerminalRequest {
            namespace: namespace.to_string(),
            shell: options.shell.clone(),
        };
        let response = self
            .backend
            .create_terminal(self.config.base_url(), target, &request)
            .await?;

        let CreateTerminalResponse {
            session_id,
            pod_name,
            container_name,
            message,
        } = response;

        let Some(session_id) = session_id.filter(|id| !id.trim().is_empty()) else {
            return Err(match message {
                Some(detail) => SessionError::Server(detail),
                None => SessionError::InvalidResponse("console returned no session id".into()),
            });
        };

        tracing::debug!(
            target: "gangway::session",
            session_id = %session_id,
            job = target,
            "terminal session created"
        );

        Ok(Session {
            session_id,
            pod_name,
            container_name,
        })
    }

    pub async fn list(&self, target: &str) -> Result<Vec<TerminalSessionInfo>, SessionError> {
        let response = self
            .backend
            .list_terminals(self.config.base_url(), target)
            .await?;
        Ok(response.sessions)
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        self.backend
            .delete_terminal(self.config.base_url(), session_id)
            .await
    }
}

#[derive(Debug, Serialize)]
struct CreateTerminalRequest {
    namespace: String,
    shell: String,
}

#[derive(Debug, Deserialize)]
struct CreateTerminalResponse {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    pod_name: Option<String>,
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TerminalSessionListResponse {
    #[serde(default)]
    sessions: Vec<TerminalSessionInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

#[async_trait]
trait ConsoleBackend: Send + Sync {
    async fn create_terminal(
        &self,
        base_url: &Url,
        target: &str,
        request: &CreateTerminalRequest,
    ) -> Result<CreateTerminalResponse, SessionError>;

    async fn list_terminals(
        &self,
        base_url: &Url,
        target: &str,
    ) -> Result<TerminalSessionListResponse, SessionError>;

    async fn delete_terminal(&self, base_url: &Url, session_id: &str)
        -> Result<(), SessionError>;
}

struct ReqwestConsoleBackend {
    client: reqwest::Client,
}

impl ReqwestConsoleBackend {
    fn new() -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

/// Surface the console's detail message when it sent one; otherwise the
/// bare status is all we know.
async fn reject(response: reqwest::Response) -> SessionError {
    let status = response.status();
    match response.json::<ErrorBody>().await.ok().and_then(|b| b.detail) {
        Some(detail) => SessionError::Server(detail),
        None => SessionError::HttpStatus(status),
    }
}

#[async_trait]
impl ConsoleBackend for ReqwestConsoleBackend {
    async fn create_terminal(
        &self,
        base_url: &Url,
        target: &str,
        request: &CreateTerminalRequest,
    ) -> Result<CreateTerminalResponse, SessionError> {
        let endpoint = base_url
            .join(&format!("deployer/jobs/{target}/terminal"))
            .map_err(|err| {
                SessionError::InvalidConfig(format!(
                    "invalid terminal endpoint for {target}: {err}"
                ))
            })?;
        let response = self.client.post(endpoint).json(request).send().await?;
        if !response.status().is_success() {
            return Err(reject(response).await);
        }
        Ok(response.json::<CreateTerminalResponse>().await?)
    }

    async fn list_terminals(
        &self,
        base_url: &Url,
        target: &str,
    ) -> Result<TerminalSessionListResponse, SessionError> {
        let endpoint = base_url
            .join(&format!("deployer/jobs/{target}/terminal/sessions"))
            .map_err(|err| {
                SessionError::InvalidConfig(format!("invalid session list endpoint: {err}"))
            })?;
        let response = self.client.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(reject(response).await);
        }
        Ok(response.json::<TerminalSessionListResponse>().await?)
    }

    async fn delete_terminal(
        &self,
        base_url: &Url,
        session_id: &str,
    ) -> Result<(), SessionError> {
        let endpoint = base_url
            .join(&format!("deployer/terminal/sessions/{session_id}"))
            .map_err(|err| {
                SessionError::InvalidConfig(format!(
                    "invalid delete endpoint for session {session_id}: {err}"
                ))
            })?;
        let response = self.client.delete(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(reject(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory console used by unit tests.
    #[derive(Default)]
    pub(crate) struct MockConsoleBackend {
        sessions: Mutex<HashMap<String, TerminalSessionInfo>>,
        reject_with: Option<String>,
        omit_session_id: bool,
    }

    impl MockConsoleBackend {
        pub(crate) fn rejecting(detail: impl Into<String>) -> Self {
            Self {
                reject_with: Some(detail.into()),
                ..Self::default()
            }
        }

        pub(crate) fn without_session_ids() -> Self {
            Self {
                omit_session_id: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ConsoleBackend for MockConsoleBackend {
        async fn create_terminal(
            &self,
            _base_url: &Url,
            target: &str,
            _request: &CreateTerminalRequest,
        ) -> Result<CreateTerminalResponse, SessionError> {
            if let Some(detail) = &self.reject_with {
                return Err(SessionError::Server(detail.clone()));
            }
            if self.omit_session_id {
                return Ok(CreateTerminalResponse {
                    session_id: None,
                    pod_name: None,
                    container_name: None,
                    message: None,
                });
            }
            let session_id = uuid::Uuid::new_v4().to_string();
            let info = TerminalSessionInfo {
                session_id: session_id.clone(),
                pod_name: Some(format!("{target}-pod-0")),
                container_name: Some("main".into()),
                created_at: None,
            };
            self.sessions
                .lock()
                .await
                .insert(session_id.clone(), info.clone());
            Ok(CreateTerminalResponse {
                session_id: Some(session_id),
                pod_name: info.pod_name,
                container_name: info.container_name,
                message: None,
            })
        }

        async fn list_terminals(
            &self,
            _base_url: &Url,
            _target: &str,
        ) -> Result<TerminalSessionListResponse, SessionError> {
            let sessions = self.sessions.lock().await;
            Ok(TerminalSessionListResponse {
                sessions: sessions.values().cloned().collect(),
            })
        }

        async fn delete_terminal(
            &self,
            _base_url: &Url,
            session_id: &str,
        ) -> Result<(), SessionError> {
            match self.sessions.lock().await.remove(session_id) {
                Some(_) => Ok(()),
                None => Err(SessionError::Server("session not found".into())),
            }
        }
    }

    pub(crate) fn manager() -> SessionManager {
        manager_with(MockConsoleBackend::default())
    }

    pub(crate) fn manager_with(backend: MockConsoleBackend) -> SessionManager {
        let config = ConsoleConfig::new("http://console.test").expect("console config");
        SessionManager::with_backend(config, Arc::new(backend))
    }
}
