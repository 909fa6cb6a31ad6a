//! Session state machine for remote rendering clients.
//!
//! This module tracks the lifecycle of one remote rendering session: creating
//! (or reopening) it through the REST API, polling until the service reports
//! it ready, connecting to its runtime and loading the model.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as a parameter (elapsed app time, no stored clock)
//! - Methods return `Vec<SessionAction>` describing remote calls to make
//! - The runtime executes actions and feeds results back as [`SessionEvent`]s
//!
//! Remote failures never surface as `Err`. They move the machine to
//! [`ConnectionState::ConnectionFailed`] with a message, or are recorded as a
//! model load error. Only misuse of [`Session::request_new_session`] is
//! returned to the caller.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ request  ┌─────────────────┐ ready  ┌─────────────────┐
//! │ Disconnected │────────>│ CreatingSession │──────>│ StartingSession │
//! └──────────────┘          └─────────────────┘        └─────────────────┘
//!        ↑                          │ rejected                 │ poll: Ready
//!        │ disconnected             ↓                          ↓
//!        │                 ┌──────────────────┐        ┌────────────┐
//!        │                 │ ConnectionFailed │<───────│ Connecting │
//!        │                 └──────────────────┘ error  └────────────┘
//!        │                          ↑                          │ connected
//!        │                          │ error                    ↓
//!        │                          │                   ┌───────────┐
//!        └──────────────────────────┴───────────────────│ Connected │
//!                                                       └───────────┘
//! ```
//!
//! `ConnectionFailed` is left only through a new
//! [`Session::request_new_session`]. There is no automatic retry.
//!
//! # Stale completions
//!
//! Every outstanding request carries a [`RequestId`]. A completion whose id is
//! not the one currently outstanding (the request was superseded by a new
//! session, a reconnect or shutdown) is dropped. Connection status
//! notifications are matched on [`SessionId`] instead.
//!
//! # Polling
//!
//! While the session is starting, property queries are spaced at least
//! `poll_interval` apart (10 seconds by default) and at most one is in flight.
//! The service throttles clients that poll faster.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::{ConnectParams, DEFAULT_MODEL_URI, SessionConfig, SessionCreationParams},
    error::{ModelLoadError, ServiceError, SessionError, SessionFailure},
};

/// Identifier of a remote rendering session, issued by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a service-issued id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag correlating a remote request with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw sequence number.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Application-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session, or the runtime disconnected cleanly
    Disconnected,
    /// Create/open request sent, waiting for the service
    CreatingSession,
    /// Session allocated, polling until the service reports it ready
    StartingSession,
    /// Connecting to the session runtime
    Connecting,
    /// Connected to the runtime
    Connected,
    /// Something failed; requires a new request to leave
    ConnectionFailed,
}

/// Session status as reported by the property query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderingSessionStatus {
    /// Status could not be determined
    Unknown,
    /// VM is still being provisioned
    Starting,
    /// Session is ready for runtime connections
    Ready,
    /// Session was stopped
    Stopped,
    /// Session lease expired
    Expired,
    /// Session failed on the service side
    Error,
}

/// Runtime connection status pushed by the remote runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Link closed
    Disconnected,
    /// Link being established
    Connecting,
    /// Link established (or failed, see the accompanying result)
    Connected,
}

/// Remote calls requested by the state machine.
///
/// The runtime executes these without blocking the frame loop and reports
/// their outcome as [`SessionEvent`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Allocate a new session
    CreateSession {
        /// Completion tag
        request: RequestId,
        /// Creation parameters
        params: SessionCreationParams,
    },

    /// Reopen an existing session by id
    OpenSession {
        /// Completion tag
        request: RequestId,
        /// Session to reopen
        session: SessionId,
    },

    /// Fetch session properties (status)
    QueryProperties {
        /// Completion tag
        request: RequestId,
        /// Session to query
        session: SessionId,
    },

    /// Connect to the runtime of a ready session
    ///
    /// Progress is reported through connection status notifications.
    ConnectToRuntime {
        /// Session to connect to
        session: SessionId,
        /// Connection parameters
        params: ConnectParams,
    },

    /// Load a model into the connected session
    LoadModel {
        /// Completion tag
        request: RequestId,
        /// Connected session
        session: SessionId,
        /// Model location
        url: String,
    },

    /// Disconnect from the session runtime and release the handle
    Disconnect {
        /// Session to release
        session: SessionId,
    },

    /// Stop the remote session so it no longer holds a VM
    StopSession {
        /// Session to stop
        session: SessionId,
    },
}

/// Completions and notifications delivered back to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Create/open succeeded
    SessionReady {
        /// Tag of the create/open request
        request: RequestId,
        /// Allocated session
        session: SessionId,
    },

    /// Create/open was rejected
    SessionCreationFailed {
        /// Tag of the create/open request
        request: RequestId,
        /// Service error
        error: ServiceError,
    },

    /// Property query finished
    PropertiesReceived {
        /// Tag of the query
        request: RequestId,
        /// Reported status or query failure
        result: Result<RenderingSessionStatus, ServiceError>,
    },

    /// Runtime connection status changed
    ConnectionStatusChanged {
        /// Session the notification belongs to
        session: SessionId,
        /// New status
        status: ConnectionStatus,
        /// Success, or the error accompanying the status
        result: Result<(), ServiceError>,
    },

    /// Model load progress in `[0, 1]`
    ModelLoadProgress {
        /// Tag of the load
        request: RequestId,
        /// Fraction complete
        progress: f32,
    },

    /// Model load finished
    ModelLoadCompleted {
        /// Tag of the load
        request: RequestId,
        /// Load outcome
        result: Result<(), ServiceError>,
    },
}

/// Minimum spacing between REST property queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingClock {
    last_rest_call: Duration,
    min_interval: Duration,
}

impl PollingClock {
    /// Clock whose first query is due `min_interval` after `now`.
    pub fn new(min_interval: Duration, now: Duration) -> Self {
        Self { last_rest_call: now, min_interval }
    }

    /// Time of the last query (or of the seed).
    pub fn last_rest_call(&self) -> Duration {
        self.last_rest_call
    }

    /// Configured spacing.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Whether a query may start at `now`.
    pub fn is_due(&self, now: Duration) -> bool {
        now.saturating_sub(self.last_rest_call) >= self.min_interval
    }

    fn record(&mut self, now: Duration) {
        self.last_rest_call = now;
    }
}

/// Everything the status presenter needs, detached from the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Current state
    pub state: ConnectionState,
    /// State message (failure text when `ConnectionFailed`)
    pub message: String,
    /// Current session, if any
    pub session_id: Option<SessionId>,
    /// When the session became ready to start, in app time
    pub session_started_at: Option<Duration>,
    /// Whether a model load was issued for the current connection
    pub model_load_triggered: bool,
    /// Model load progress in `[0, 1]`
    pub model_load_progress: f32,
    /// Whether the model load finished (successfully or not)
    pub model_load_finished: bool,
    /// Failure text of a finished, unsuccessful load
    pub model_load_error: Option<String>,
}

/// Remote rendering session state machine.
///
/// A pure state machine: no I/O, no clock. App time is passed to the methods
/// that need it.
#[derive(Debug, Clone)]
pub struct Session {
    state: ConnectionState,
    message: String,
    failure: Option<SessionFailure>,
    /// Settings of the current request
    config: Option<SessionConfig>,
    session: Option<SessionId>,
    session_started_at: Option<Duration>,
    clock: PollingClock,
    next_request: u64,
    pending_create: Option<RequestId>,
    pending_poll: Option<RequestId>,
    pending_load: Option<RequestId>,
    is_connected: bool,
    /// Property query reported `Ready`; polling stops
    session_started: bool,
    model_load_triggered: bool,
    model_load_finished: bool,
    model_load_progress: f32,
    model_load_error: Option<ModelLoadError>,
    model_load_started_at: Option<Duration>,
    needs_status_update: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a machine in `Disconnected`.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            message: String::new(),
            failure: None,
            config: None,
            session: None,
            session_started_at: None,
            clock: PollingClock::new(crate::config::DEFAULT_POLL_INTERVAL, Duration::ZERO),
            next_request: 0,
            pending_create: None,
            pending_poll: None,
            pending_load: None,
            is_connected: false,
            session_started: false,
            model_load_triggered: false,
            model_load_finished: false,
            model_load_progress: 0.0,
            model_load_error: None,
            model_load_started_at: None,
            // Presenter shows "Disconnected" on the first frame.
            needs_status_update: true,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current state message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Why the machine is in `ConnectionFailed`, if it is.
    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    /// Current session handle.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Whether the runtime connection is up.
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Whether the service reported the session ready.
    pub fn session_started(&self) -> bool {
        self.session_started
    }

    /// Whether a model load was issued for the current connection.
    pub fn model_load_triggered(&self) -> bool {
        self.model_load_triggered
    }

    /// Whether the model load finished.
    pub fn model_load_finished(&self) -> bool {
        self.model_load_finished
    }

    /// Model load progress in `[0, 1]`.
    pub fn model_load_progress(&self) -> f32 {
        self.model_load_progress
    }

    /// Error of a finished, failed model load.
    pub fn model_load_error(&self) -> Option<&ModelLoadError> {
        self.model_load_error.as_ref()
    }

    /// Property query spacing state.
    pub fn polling_clock(&self) -> PollingClock {
        self.clock
    }

    /// Whether a property query is in flight.
    pub fn has_pending_poll(&self) -> bool {
        self.pending_poll.is_some()
    }

    /// Whether the presenter should refresh.
    pub fn needs_status_update(&self) -> bool {
        self.needs_status_update
    }

    /// Start creating a session, or reopen `config.session_override`.
    ///
    /// Releases the previous session, if any.
    ///
    /// # Errors
    ///
    /// - `AlreadyInProgress` while creating, starting or connecting
    /// - `AlreadyConnected` while connected
    pub fn request_new_session(
        &mut self,
        config: &SessionConfig,
        now: Duration,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            ConnectionState::CreatingSession
            | ConnectionState::StartingSession
            | ConnectionState::Connecting => {
                return Err(SessionError::AlreadyInProgress { state: self.state });
            },
            ConnectionState::Connected => return Err(SessionError::AlreadyConnected),
            ConnectionState::Disconnected | ConnectionState::ConnectionFailed => {},
        }

        let mut actions = Vec::new();
        if let Some(previous) = self.session.take() {
            debug!(session = %previous, "releasing previous session");
            actions.push(SessionAction::Disconnect { session: previous });
        }

        self.reset_session();
        self.clock = PollingClock::new(config.poll_interval, now);
        self.config = Some(config.clone());

        let request = self.next_request_id();
        self.pending_create = Some(request);

        let action = match &config.session_override {
            Some(session) => {
                info!(%request, %session, "reopening session");
                SessionAction::OpenSession { request, session: session.clone() }
            },
            None => {
                info!(%request, vm_size = ?config.creation.vm_size, "creating session");
                SessionAction::CreateSession { request, params: config.creation.clone() }
            },
        };
        actions.push(action);

        self.set_state(ConnectionState::CreatingSession, String::new());
        Ok(actions)
    }

    /// Create/open completed: start polling the new session.
    pub fn on_session_ready(
        &mut self,
        request: RequestId,
        session: SessionId,
        now: Duration,
    ) -> Vec<SessionAction> {
        if self.pending_create != Some(request) {
            debug!(%request, %session, "dropping stale session completion");
            return Vec::new();
        }
        self.pending_create = None;

        info!(%session, "session allocated, waiting for it to start");
        self.session = Some(session);
        self.session_started_at = Some(now);
        self.clock = PollingClock::new(self.clock.min_interval(), now);
        self.set_state(ConnectionState::StartingSession, String::new());

        Vec::new()
    }

    /// Create/open was rejected.
    pub fn on_session_creation_failed(
        &mut self,
        request: RequestId,
        error: &ServiceError,
    ) -> Vec<SessionAction> {
        if self.pending_create != Some(request) {
            debug!(%request, %error, "dropping stale session failure");
            return Vec::new();
        }
        self.pending_create = None;

        self.fail(SessionFailure::Creation(error.to_string()));
        Vec::new()
    }

    /// Called every frame; issues a property query when one is due.
    ///
    /// Returns immediately whether or not a query was issued.
    pub fn poll_session_status(&mut self, now: Duration) -> Vec<SessionAction> {
        if self.state != ConnectionState::StartingSession || self.session_started {
            return Vec::new();
        }
        let Some(session) = self.session.clone() else {
            return Vec::new();
        };

        // Elapsed time on the status display changes every frame.
        self.needs_status_update = true;

        if self.pending_poll.is_some() || !self.clock.is_due(now) {
            return Vec::new();
        }

        self.clock.record(now);
        let request = self.next_request_id();
        self.pending_poll = Some(request);

        debug!(%request, %session, "querying session properties");
        vec![SessionAction::QueryProperties { request, session }]
    }

    /// Property query finished.
    pub fn on_session_properties(
        &mut self,
        request: RequestId,
        result: Result<RenderingSessionStatus, ServiceError>,
    ) -> Vec<SessionAction> {
        if self.pending_poll != Some(request) {
            debug!(%request, "dropping stale property result");
            return Vec::new();
        }
        self.pending_poll = None;

        if self.state != ConnectionState::StartingSession {
            debug!(%request, state = ?self.state, "ignoring property result outside StartingSession");
            return Vec::new();
        }

        match result {
            Ok(RenderingSessionStatus::Ready) => {
                let Some(session) = self.session.clone() else {
                    return Vec::new();
                };
                let params = self.config.as_ref().map(|c| c.connect).unwrap_or_default();

                info!(%session, "session ready, connecting to runtime");
                self.session_started = true;
                self.set_state(ConnectionState::Connecting, String::new());
                vec![SessionAction::ConnectToRuntime { session, params }]
            },
            Ok(RenderingSessionStatus::Error) => {
                self.fail(SessionFailure::SessionError);
                Vec::new()
            },
            Ok(RenderingSessionStatus::Stopped) => {
                self.fail(SessionFailure::Stopped);
                Vec::new()
            },
            Ok(RenderingSessionStatus::Expired) => {
                self.fail(SessionFailure::Expired);
                Vec::new()
            },
            Ok(status @ (RenderingSessionStatus::Starting | RenderingSessionStatus::Unknown)) => {
                debug!(?status, "session not ready yet");
                Vec::new()
            },
            Err(error) => {
                warn!(%error, "session property query failed");
                self.fail(SessionFailure::StatusQuery(error.to_string()));
                Vec::new()
            },
        }
    }

    /// Runtime connection status notification.
    pub fn on_connection_status_changed(
        &mut self,
        session: &SessionId,
        status: ConnectionStatus,
        result: Result<(), ServiceError>,
    ) -> Vec<SessionAction> {
        if self.session.as_ref() != Some(session) {
            debug!(%session, ?status, "dropping status for a released session");
            return Vec::new();
        }
        if self.state == ConnectionState::ConnectionFailed {
            debug!(%session, ?status, "dropping status while failed");
            return Vec::new();
        }

        match (status, result) {
            (ConnectionStatus::Connecting, result) => {
                let message = result.err().map(|e| e.to_string()).unwrap_or_default();
                self.is_connected = false;
                self.set_state(ConnectionState::Connecting, message);
            },
            (ConnectionStatus::Connected, Ok(())) => {
                info!(%session, "connected to runtime");
                // A fresh connection always reloads the model.
                self.reset_model_load();
                self.is_connected = true;
                self.session_started = true;
                self.set_state(ConnectionState::Connected, String::new());
            },
            (ConnectionStatus::Connected, Err(error)) => {
                self.reset_model_load();
                self.is_connected = false;
                self.fail(SessionFailure::Connection(error.to_string()));
            },
            (ConnectionStatus::Disconnected, Ok(())) => {
                info!(%session, "disconnected from runtime");
                self.reset_model_load();
                self.is_connected = false;
                self.set_state(ConnectionState::Disconnected, String::new());
            },
            (ConnectionStatus::Disconnected, Err(error)) => {
                self.reset_model_load();
                self.is_connected = false;
                self.fail(SessionFailure::Connection(error.to_string()));
            },
        }

        Vec::new()
    }

    /// Per-frame update; triggers the model load once per connection.
    pub fn tick(&mut self, now: Duration) -> Vec<SessionAction> {
        if !self.is_connected || self.model_load_triggered {
            return Vec::new();
        }
        let Some(session) = self.session.clone() else {
            return Vec::new();
        };

        // Latch before issuing so a second tick cannot trigger again.
        self.model_load_triggered = true;
        self.model_load_finished = false;
        self.model_load_progress = 0.0;
        self.model_load_error = None;
        self.model_load_started_at = Some(now);
        self.needs_status_update = true;

        let url = self
            .config
            .as_ref()
            .map_or_else(|| DEFAULT_MODEL_URI.to_string(), |c| c.model_uri.clone());
        let request = self.next_request_id();
        self.pending_load = Some(request);

        info!(%request, %url, "loading model");
        vec![SessionAction::LoadModel { request, session, url }]
    }

    /// Model load progress notification.
    pub fn on_model_load_progress(
        &mut self,
        request: RequestId,
        progress: f32,
    ) -> Vec<SessionAction> {
        if self.pending_load != Some(request) {
            debug!(%request, "dropping stale load progress");
            return Vec::new();
        }

        self.model_load_progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        self.needs_status_update = true;
        Vec::new()
    }

    /// Model load finished. Does not change the connection state.
    pub fn on_model_load_completed(
        &mut self,
        request: RequestId,
        result: Result<(), ServiceError>,
        now: Duration,
    ) -> Vec<SessionAction> {
        if self.pending_load != Some(request) {
            debug!(%request, "dropping stale load result");
            return Vec::new();
        }
        self.pending_load = None;

        let elapsed = self.model_load_started_at.map(|start| now.saturating_sub(start));
        match result {
            Ok(()) => {
                info!(?elapsed, "model loaded");
                self.model_load_progress = 1.0;
            },
            Err(error) => {
                warn!(%error, ?elapsed, "model load failed");
                self.model_load_error = Some(ModelLoadError(error.to_string()));
            },
        }
        self.model_load_finished = true;
        self.needs_status_update = true;

        Vec::new()
    }

    /// Apply one completion from the event queue.
    pub fn handle(&mut self, event: SessionEvent, now: Duration) -> Vec<SessionAction> {
        match event {
            SessionEvent::SessionReady { request, session } => {
                self.on_session_ready(request, session, now)
            },
            SessionEvent::SessionCreationFailed { request, error } => {
                self.on_session_creation_failed(request, &error)
            },
            SessionEvent::PropertiesReceived { request, result } => {
                self.on_session_properties(request, result)
            },
            SessionEvent::ConnectionStatusChanged { session, status, result } => {
                self.on_connection_status_changed(&session, status, result)
            },
            SessionEvent::ModelLoadProgress { request, progress } => {
                self.on_model_load_progress(request, progress)
            },
            SessionEvent::ModelLoadCompleted { request, result } => {
                self.on_model_load_completed(request, result, now)
            },
        }
    }

    /// Release the session on app teardown.
    ///
    /// Outstanding completions become stale.
    pub fn shutdown(&mut self) -> Vec<SessionAction> {
        let stop = self.config.as_ref().is_some_and(|c| c.stop_session_on_exit);

        let mut actions = Vec::new();
        if let Some(session) = self.session.take() {
            info!(%session, stop, "releasing session");
            actions.push(SessionAction::Disconnect { session: session.clone() });
            if stop {
                actions.push(SessionAction::StopSession { session });
            }
        }

        self.reset_session();
        self.set_state(ConnectionState::Disconnected, String::new());
        actions
    }

    /// Current status, for the presenter.
    pub fn current_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            message: self.message.clone(),
            session_id: self.session.clone(),
            session_started_at: self.session_started_at,
            model_load_triggered: self.model_load_triggered,
            model_load_progress: self.model_load_progress,
            model_load_finished: self.model_load_finished,
            model_load_error: self.model_load_error.as_ref().map(|e| e.0.clone()),
        }
    }

    /// Snapshot if the presenter needs a refresh, clearing the flag.
    pub fn take_status_update(&mut self) -> Option<StatusSnapshot> {
        if !self.needs_status_update {
            return None;
        }
        self.needs_status_update = false;
        Some(self.current_snapshot())
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn set_state(&mut self, state: ConnectionState, message: String) {
        if state != ConnectionState::ConnectionFailed {
            self.failure = None;
        }
        self.state = state;
        self.message = message;
        self.needs_status_update = true;
    }

    fn fail(&mut self, failure: SessionFailure) {
        warn!(%failure, previous = ?self.state, "session failed");
        self.set_state(ConnectionState::ConnectionFailed, failure.to_string());
        self.failure = Some(failure);
    }

    fn reset_model_load(&mut self) {
        self.model_load_triggered = false;
        self.model_load_finished = false;
        self.model_load_progress = 0.0;
        self.model_load_error = None;
        self.model_load_started_at = None;
        self.pending_load = None;
    }

    fn reset_session(&mut self) {
        self.reset_model_load();
        self.pending_create = None;
        self.pending_poll = None;
        self.is_connected = false;
        self.session_started = false;
        self.session_started_at = None;
    }
}
