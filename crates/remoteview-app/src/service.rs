//! Remote rendering service abstraction.
//!
//! The [`SessionService`] trait stands in for the vendor REST API and the
//! runtime connection. Production wraps an HTTP client; tests use a scripted
//! simulation. Calls may take seconds, so the runtime never awaits them on
//! the frame loop.

use async_trait::async_trait;
use remoteview_core::{
    ConnectionStatus, RenderingSessionStatus, RequestId, ServiceError, SessionEvent, SessionId,
    config::{ConnectParams, SessionCreationParams},
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Remote session management and runtime connection.
///
/// Every method is a single request/response exchange, except
/// [`SessionService::connect_to_runtime`] which keeps the notifier to report
/// later status changes (such as the runtime dropping the link) and
/// [`SessionService::load_model`] which reports progress while it runs.
#[async_trait]
pub trait SessionService: Send + Sync + 'static {
    /// Allocate a new session.
    async fn create_session(
        &self,
        params: SessionCreationParams,
    ) -> Result<SessionId, ServiceError>;

    /// Reopen an existing session by id.
    async fn open_session(&self, session: &SessionId) -> Result<SessionId, ServiceError>;

    /// Query the session status.
    async fn session_properties(
        &self,
        session: &SessionId,
    ) -> Result<RenderingSessionStatus, ServiceError>;

    /// Connect to the runtime of a ready session.
    ///
    /// Status changes are reported through `notifier`, both during the
    /// connect and for the lifetime of the connection. An `Err` means the
    /// attempt failed outright.
    async fn connect_to_runtime(
        &self,
        session: &SessionId,
        params: ConnectParams,
        notifier: ConnectionNotifier,
    ) -> Result<(), ServiceError>;

    /// Load a model into the connected session.
    async fn load_model(
        &self,
        session: &SessionId,
        url: &str,
        progress: ProgressNotifier,
    ) -> Result<(), ServiceError>;

    /// Disconnect from the runtime and release the local handle.
    async fn disconnect(&self, session: &SessionId) -> Result<(), ServiceError>;

    /// Stop the remote session.
    async fn stop_session(&self, session: &SessionId) -> Result<(), ServiceError>;
}

/// Pushes runtime connection status changes for one session into the
/// completion queue.
#[derive(Debug, Clone)]
pub struct ConnectionNotifier {
    session: SessionId,
    events: UnboundedSender<SessionEvent>,
}

impl ConnectionNotifier {
    /// Notifier for `session` delivering into `events`.
    pub fn new(session: SessionId, events: UnboundedSender<SessionEvent>) -> Self {
        Self { session, events }
    }

    /// Session this notifier reports for.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Report a status change.
    ///
    /// Returns `false` once the runtime is gone.
    pub fn notify(&self, status: ConnectionStatus, result: Result<(), ServiceError>) -> bool {
        let event = SessionEvent::ConnectionStatusChanged {
            session: self.session.clone(),
            status,
            result,
        };
        let delivered = self.events.send(event).is_ok();
        if !delivered {
            debug!(session = %self.session, ?status, "runtime gone, status dropped");
        }
        delivered
    }
}

/// Pushes model load progress for one load request into the completion queue.
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    request: RequestId,
    events: UnboundedSender<SessionEvent>,
}

impl ProgressNotifier {
    /// Notifier for the load tagged `request`.
    pub fn new(request: RequestId, events: UnboundedSender<SessionEvent>) -> Self {
        Self { request, events }
    }

    /// Report progress in `[0, 1]`. Returns `false` once the runtime is gone.
    pub fn report(&self, progress: f32) -> bool {
        self.events
            .send(SessionEvent::ModelLoadProgress { request: self.request, progress })
            .is_ok()
    }
}
