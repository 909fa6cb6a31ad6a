//! Simulated rendering service for runtime tests.
//!
//! Answers every call immediately from a [`ServiceScript`] and records what
//! was called, so tests can drive the real [`remoteview_app::Runtime`]
//! without a network.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use remoteview_app::{ConnectionNotifier, ProgressNotifier, SessionService};
use remoteview_core::{
    ConnectionStatus, RenderingSessionStatus, ServiceError, SessionId,
    config::{ConnectParams, SessionCreationParams},
};
use tracing::debug;

use crate::script::ServiceScript;

/// Number of calls per service method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `create_session`
    pub create: usize,
    /// `open_session`
    pub open: usize,
    /// `session_properties`
    pub properties: usize,
    /// `connect_to_runtime`
    pub connect: usize,
    /// `load_model`
    pub load: usize,
    /// `disconnect`
    pub disconnect: usize,
    /// `stop_session`
    pub stop: usize,
}

#[derive(Default)]
struct SimState {
    calls: CallCounts,
    notifier: Option<ConnectionNotifier>,
    loaded: Vec<String>,
    released: Vec<SessionId>,
    stopped: Vec<SessionId>,
}

/// Scripted [`SessionService`].
pub struct SimService {
    script: ServiceScript,
    state: Mutex<SimState>,
}

impl SimService {
    /// Service answering from `script`.
    pub fn new(script: ServiceScript) -> Self {
        Self { script, state: Mutex::new(SimState::default()) }
    }

    /// Calls made so far.
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Model URLs requested so far.
    pub fn loaded_models(&self) -> Vec<String> {
        self.lock().loaded.clone()
    }

    /// Sessions disconnected so far.
    pub fn released_sessions(&self) -> Vec<SessionId> {
        self.lock().released.clone()
    }

    /// Sessions stopped so far.
    pub fn stopped_sessions(&self) -> Vec<SessionId> {
        self.lock().stopped.clone()
    }

    /// Drop the runtime connection from the service side.
    ///
    /// Returns `false` if nothing is connected or the runtime is gone.
    pub fn force_disconnect(&self, result: Result<(), ServiceError>) -> bool {
        let notifier = self.lock().notifier.take();
        notifier.is_some_and(|n| n.notify(ConnectionStatus::Disconnected, result))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionService for SimService {
    async fn create_session(
        &self,
        params: SessionCreationParams,
    ) -> Result<SessionId, ServiceError> {
        debug!(?params, "sim: create session");
        let call = {
            let mut state = self.lock();
            state.calls.create += 1;
            state.calls.create - 1
        };
        self.script.created_session(call)
    }

    async fn open_session(&self, session: &SessionId) -> Result<SessionId, ServiceError> {
        debug!(%session, "sim: open session");
        self.lock().calls.open += 1;
        self.script.create.clone().map(|_| session.clone())
    }

    async fn session_properties(
        &self,
        session: &SessionId,
    ) -> Result<RenderingSessionStatus, ServiceError> {
        let call = {
            let mut state = self.lock();
            state.calls.properties += 1;
            state.calls.properties - 1
        };
        let response = self.script.property_response(call);
        debug!(%session, call, ?response, "sim: session properties");
        response
    }

    async fn connect_to_runtime(
        &self,
        session: &SessionId,
        params: ConnectParams,
        notifier: ConnectionNotifier,
    ) -> Result<(), ServiceError> {
        debug!(%session, ?params, "sim: connect");
        self.lock().calls.connect += 1;

        notifier.notify(ConnectionStatus::Connecting, Ok(()));
        self.script.connect.clone()?;

        notifier.notify(ConnectionStatus::Connected, Ok(()));
        self.lock().notifier = Some(notifier);
        Ok(())
    }

    async fn load_model(
        &self,
        session: &SessionId,
        url: &str,
        progress: ProgressNotifier,
    ) -> Result<(), ServiceError> {
        debug!(%session, url, "sim: load model");
        {
            let mut state = self.lock();
            state.calls.load += 1;
            state.loaded.push(url.to_string());
        }

        for value in &self.script.load_progress {
            progress.report(*value);
        }
        self.script.load.clone()
    }

    async fn disconnect(&self, session: &SessionId) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.disconnect += 1;
        state.released.push(session.clone());
        if state.notifier.as_ref().is_some_and(|n| n.session() == session) {
            state.notifier = None;
        }
        Ok(())
    }

    async fn stop_session(&self, session: &SessionId) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.stop += 1;
        state.stopped.push(session.clone());
        Ok(())
    }
}
