//! Session service backed by the session management REST API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use remoteview_app::{ConnectionNotifier, ProgressNotifier, SessionService};
use remoteview_core::{
    RenderingSessionStatus, ServiceError, SessionId,
    config::{AccountSettings, ConnectParams, SessionCreationParams, VmSize},
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{endpoints::Endpoints, error::ClientError, token::TokenCache};

/// Upper bound for a single REST request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`SessionService`] talking to the rendering service over HTTPS.
///
/// Access tokens are fetched with the account id and key and reused until
/// they near expiry. Runtime connection and model loading are not REST
/// operations and fail with [`ServiceError::Unsupported`].
#[derive(Debug)]
pub struct RestSessionService {
    http: reqwest::Client,
    account: AccountSettings,
    endpoints: Endpoints,
    token: Mutex<TokenCache>,
}

impl RestSessionService {
    /// Service for `account`, with endpoints derived from its domain and
    /// region.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Build`] if the HTTP client cannot be set up.
    pub fn new(account: AccountSettings) -> Result<Self, ClientError> {
        let endpoints = Endpoints::for_account(&account);
        Self::with_endpoints(account, endpoints)
    }

    /// Service for `account` using explicit endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Build`] if the HTTP client cannot be set up.
    pub fn with_endpoints(
        account: AccountSettings,
        endpoints: Endpoints,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, account, endpoints, token: Mutex::new(TokenCache::default()) })
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let mut cache = self.token.lock().await;
        let now = Instant::now();
        if let Some(token) = cache.get(now) {
            return Ok(token.to_string());
        }

        debug!(account = %self.account.account_id, "fetching access token");
        let response = self
            .http
            .get(self.endpoints.token())
            .bearer_auth(format!("{}:{}", self.account.account_id, self.account.account_key))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, None).await?;
        let body: TokenResponse = response.json().await.map_err(transport_error)?;

        cache.store(body.access_token.clone(), now);
        Ok(body.access_token)
    }

    /// Send an authorized request, dropping the cached token if it was
    /// rejected.
    async fn send(
        &self,
        request: RequestBuilder,
        session: Option<&SessionId>,
    ) -> Result<Response, ServiceError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await.map_err(transport_error)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.token.lock().await.invalidate();
        }
        check_status(response, session).await
    }

    async fn properties(&self, session: &SessionId) -> Result<SessionProperties, ServiceError> {
        let request = self.http.get(self.endpoints.session(session));
        self.send(request, Some(session)).await?.json().await.map_err(transport_error)
    }
}

#[async_trait]
impl SessionService for RestSessionService {
    async fn create_session(
        &self,
        params: SessionCreationParams,
    ) -> Result<SessionId, ServiceError> {
        let session = new_session_id();
        let body = CreateSessionBody {
            max_lease_time_minutes: lease_minutes(params.max_lease),
            size: params.vm_size,
        };

        let request = self.http.put(self.endpoints.session(&session)).json(&body);
        let created: SessionProperties =
            self.send(request, None).await?.json().await.map_err(transport_error)?;

        info!(session = %created.id, size = ?params.vm_size, "session created");
        Ok(SessionId::new(created.id))
    }

    async fn open_session(&self, session: &SessionId) -> Result<SessionId, ServiceError> {
        let properties = self.properties(session).await?;
        info!(session = %properties.id, status = %properties.status, "session opened");
        Ok(SessionId::new(properties.id))
    }

    async fn session_properties(
        &self,
        session: &SessionId,
    ) -> Result<RenderingSessionStatus, ServiceError> {
        let properties = self.properties(session).await?;
        Ok(parse_status(&properties.status))
    }

    async fn connect_to_runtime(
        &self,
        session: &SessionId,
        _params: ConnectParams,
        _notifier: ConnectionNotifier,
    ) -> Result<(), ServiceError> {
        warn!(%session, "runtime connection requires the rendering runtime");
        Err(ServiceError::Unsupported("runtime connection"))
    }

    async fn load_model(
        &self,
        _session: &SessionId,
        _url: &str,
        _progress: ProgressNotifier,
    ) -> Result<(), ServiceError> {
        Err(ServiceError::Unsupported("model loading"))
    }

    async fn disconnect(&self, session: &SessionId) -> Result<(), ServiceError> {
        debug!(%session, "no runtime link to close");
        Ok(())
    }

    async fn stop_session(&self, session: &SessionId) -> Result<(), ServiceError> {
        let request = self.http.post(self.endpoints.stop(session));
        self.send(request, Some(session)).await?;
        info!(%session, "session stopped");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "AccessToken")]
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody {
    max_lease_time_minutes: u64,
    size: VmSize,
}

#[derive(Debug, Deserialize)]
struct SessionProperties {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn new_session_id() -> SessionId {
    SessionId::new(format!("remoteview-{:016x}", rand::random::<u64>()))
}

/// Whole minutes, rounded up; the service rejects a zero lease.
fn lease_minutes(lease: Duration) -> u64 {
    lease.as_secs().div_ceil(60).max(1)
}

fn parse_status(status: &str) -> RenderingSessionStatus {
    match status.to_ascii_lowercase().as_str() {
        "starting" => RenderingSessionStatus::Starting,
        "ready" => RenderingSessionStatus::Ready,
        "stopped" => RenderingSessionStatus::Stopped,
        "expired" => RenderingSessionStatus::Expired,
        "error" => RenderingSessionStatus::Error,
        _ => RenderingSessionStatus::Unknown,
    }
}

async fn check_status(
    response: Response,
    session: Option<&SessionId>,
) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), session, &body))
}

fn status_error(status: u16, session: Option<&SessionId>, body: &str) -> ServiceError {
    match (status, session) {
        (401 | 403, _) => ServiceError::AuthenticationFailed,
        (404, Some(session)) => ServiceError::SessionNotFound(session.clone()),
        (408 | 504, _) => ServiceError::Timeout,
        _ => ServiceError::Rejected { status, message: error_message(body) },
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "no details".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn transport_error(error: reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::ConnectionLost(error.to_string())
    }
}
