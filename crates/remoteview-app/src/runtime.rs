//! Generic runtime driving the session state machine once per frame.
//!
//! # Architecture
//!
//! ```text
//! Driver::next_frame()
//!     │
//!     ▼
//! Runtime::frame()
//!     ├─ drain completion queue ──> Session::handle
//!     ├─ Session::poll_session_status
//!     ├─ Session::tick
//!     ├─ spawn one task per SessionAction ──> SessionService
//!     │                                           │
//!     │            SessionEvent (completion queue) │
//!     │  <────────────────────────────────────────┘
//!     └─ status refresh ──> StatusPresenter
//! ```
//!
//! The frame never awaits the service. Remote calls run as spawned tasks whose
//! only side effect is sending a [`SessionEvent`] back into the queue, so the
//! session is only ever touched from the frame loop.

use std::{sync::Arc, time::Duration};

use remoteview_core::{
    ConnectionStatus, Session, SessionAction, SessionConfig, SessionError, SessionEvent,
    StatusSnapshot, status_lines,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::{
    driver::Driver,
    service::{ConnectionNotifier, ProgressNotifier, SessionService},
};

/// Errors that end [`Runtime::run`].
#[derive(Debug, Error)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The frame loop failed.
    #[error("driver error: {0}")]
    Driver(#[source] E),

    /// The initial session request was rejected.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Frame-driven runtime for one remote rendering session.
pub struct Runtime<D: Driver, S: SessionService> {
    driver: D,
    service: Arc<S>,
    config: SessionConfig,
    session: Session,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    start: D::Instant,
}

impl<D: Driver, S: SessionService> Runtime<D, S> {
    /// Create a runtime; app time starts at the driver's current instant.
    pub fn new(driver: D, service: Arc<S>, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let start = driver.now();
        Self { driver, service, config, session: Session::new(), events_tx, events_rx, start }
    }

    /// The session state machine.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// App time since the runtime was created.
    pub fn elapsed(&self) -> Duration {
        self.driver.now() - self.start
    }

    /// Request a new session with the runtime's configuration.
    ///
    /// # Errors
    ///
    /// Returns the state machine's rejection when a session is busy or
    /// connected.
    pub fn request_new_session(&mut self) -> Result<(), SessionError> {
        let now = self.elapsed();
        let actions = self.session.request_new_session(&self.config, now)?;
        self.spawn_actions(actions);
        Ok(())
    }

    /// Run one frame.
    pub fn frame(&mut self) {
        let now = self.elapsed();
        let mut actions = Vec::new();

        while let Ok(event) = self.events_rx.try_recv() {
            actions.extend(self.session.handle(event, now));
        }

        actions.extend(self.session.poll_session_status(now));
        actions.extend(self.session.tick(now));
        self.spawn_actions(actions);

        if let Some(snapshot) = self.session.take_status_update() {
            self.present(&snapshot, now);
        }
    }

    /// Request a session and run frames until the driver stops.
    ///
    /// Releases the session before returning, also when the driver fails.
    ///
    /// # Errors
    ///
    /// - `Session` if the initial request is rejected
    /// - `Driver` if the frame loop fails
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.request_new_session()?;

        let result = loop {
            match self.driver.next_frame().await {
                Ok(true) => self.frame(),
                Ok(false) => break Ok(()),
                Err(e) => break Err(RuntimeError::Driver(e)),
            }
        };

        self.shutdown().await;
        result
    }

    /// Release the session and stop the driver.
    ///
    /// Teardown calls are awaited in order so they complete before the
    /// process exits.
    pub async fn shutdown(&mut self) {
        for action in self.session.shutdown() {
            if let Some(event) =
                execute_action(self.service.as_ref(), action, &self.events_tx).await
            {
                debug!(?event, "completion after shutdown ignored");
            }
        }
        self.driver.stop();
    }

    fn spawn_actions(&self, actions: Vec<SessionAction>) {
        for action in actions {
            let service = Arc::clone(&self.service);
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                if let Some(event) = execute_action(service.as_ref(), action, &events).await
                    && events.send(event).is_err()
                {
                    debug!("runtime gone, completion dropped");
                }
            });
        }
    }

    fn present(&mut self, snapshot: &StatusSnapshot, now: Duration) {
        let lines = status_lines(snapshot, now);
        if lines.is_empty() {
            self.driver.clear_lines();
        } else {
            self.driver.set_lines(&lines);
        }
    }
}

/// Perform one action against the service.
///
/// Returns the completion to feed back into the session, if the action has
/// one. Status notifications and load progress are sent directly on `events`.
pub async fn execute_action<S: SessionService + ?Sized>(
    service: &S,
    action: SessionAction,
    events: &UnboundedSender<SessionEvent>,
) -> Option<SessionEvent> {
    match action {
        SessionAction::CreateSession { request, params } => {
            Some(match service.create_session(params).await {
                Ok(session) => SessionEvent::SessionReady { request, session },
                Err(error) => SessionEvent::SessionCreationFailed { request, error },
            })
        },
        SessionAction::OpenSession { request, session } => {
            Some(match service.open_session(&session).await {
                Ok(session) => SessionEvent::SessionReady { request, session },
                Err(error) => SessionEvent::SessionCreationFailed { request, error },
            })
        },
        SessionAction::QueryProperties { request, session } => {
            let result = service.session_properties(&session).await;
            Some(SessionEvent::PropertiesReceived { request, result })
        },
        SessionAction::ConnectToRuntime { session, params } => {
            let notifier = ConnectionNotifier::new(session.clone(), events.clone());
            match service.connect_to_runtime(&session, params, notifier).await {
                Ok(()) => None,
                Err(error) => Some(SessionEvent::ConnectionStatusChanged {
                    session,
                    status: ConnectionStatus::Disconnected,
                    result: Err(error),
                }),
            }
        },
        SessionAction::LoadModel { request, session, url } => {
            let progress = ProgressNotifier::new(request, events.clone());
            let result = service.load_model(&session, &url, progress).await;
            Some(SessionEvent::ModelLoadCompleted { request, result })
        },
        SessionAction::Disconnect { session } => {
            if let Err(error) = service.disconnect(&session).await {
                warn!(%session, %error, "disconnect failed");
            }
            None
        },
        SessionAction::StopSession { session } => {
            if let Err(error) = service.stop_session(&session).await {
                warn!(%session, %error, "stopping session failed");
            }
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use remoteview_core::{
        ConnectionState, RenderingSessionStatus, ServiceError, SessionId, StatusLine,
        config::{AccountSettings, ConnectParams, SessionCreationParams},
    };

    use super::*;
    use crate::driver::StatusPresenter;

    /// Service that rejects every session and counts teardown calls.
    #[derive(Default)]
    struct RejectingService {
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl SessionService for RejectingService {
        async fn create_session(
            &self,
            _params: SessionCreationParams,
        ) -> Result<SessionId, ServiceError> {
            Err(ServiceError::Rejected { status: 403, message: "quota exceeded".into() })
        }

        async fn open_session(&self, session: &SessionId) -> Result<SessionId, ServiceError> {
            Err(ServiceError::SessionNotFound(session.clone()))
        }

        async fn session_properties(
            &self,
            _session: &SessionId,
        ) -> Result<RenderingSessionStatus, ServiceError> {
            Ok(RenderingSessionStatus::Unknown)
        }

        async fn connect_to_runtime(
            &self,
            _session: &SessionId,
            _params: ConnectParams,
            _notifier: ConnectionNotifier,
        ) -> Result<(), ServiceError> {
            Err(ServiceError::Timeout)
        }

        async fn load_model(
            &self,
            _session: &SessionId,
            _url: &str,
            _progress: ProgressNotifier,
        ) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn disconnect(&self, _session: &SessionId) -> Result<(), ServiceError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_session(&self, _session: &SessionId) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FrameCounter {
        frames: u64,
        lines: Vec<Vec<StatusLine>>,
        stopped: bool,
    }

    impl StatusPresenter for FrameCounter {
        fn set_lines(&mut self, lines: &[StatusLine]) {
            self.lines.push(lines.to_vec());
        }

        fn clear_lines(&mut self) {
            self.lines.push(Vec::new());
        }
    }

    impl Driver for FrameCounter {
        type Error = Infallible;
        type Instant = Duration;

        async fn next_frame(&mut self) -> Result<bool, Self::Error> {
            tokio::task::yield_now().await;
            self.frames += 1;
            Ok(self.frames <= 3)
        }

        fn now(&self) -> Duration {
            Duration::from_millis(self.frames * 16)
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new(AccountSettings::new("id", "key", "domain"))
    }

    #[tokio::test]
    async fn rejected_creation_is_shown_as_failure() {
        let service = Arc::new(RejectingService::default());
        let mut runtime = Runtime::new(FrameCounter::default(), Arc::clone(&service), config());

        runtime.run().await.unwrap();

        assert!(runtime.driver().stopped);
        assert_eq!(runtime.session().state(), ConnectionState::Disconnected);

        let failure = runtime
            .driver()
            .lines
            .iter()
            .find(|lines| lines.first().is_some_and(|l| l.text == "Failed to connect"))
            .expect("failure should have been presented");
        assert_eq!(failure[1].text, "Error: quota exceeded (status 403)");
    }

    #[tokio::test]
    async fn busy_request_is_rejected() {
        let service = Arc::new(RejectingService::default());
        let mut runtime = Runtime::new(FrameCounter::default(), service, config());

        runtime.request_new_session().unwrap();
        assert!(matches!(
            runtime.request_new_session(),
            Err(SessionError::AlreadyInProgress { state: ConnectionState::CreatingSession })
        ));
    }

    #[tokio::test]
    async fn connect_error_becomes_status_change() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = SessionId::new("s1");

        let event = execute_action(
            &RejectingService::default(),
            SessionAction::ConnectToRuntime { session: session.clone(), params: ConnectParams::default() },
            &tx,
        )
        .await;

        assert_eq!(
            event,
            Some(SessionEvent::ConnectionStatusChanged {
                session,
                status: ConnectionStatus::Disconnected,
                result: Err(ServiceError::Timeout),
            })
        );
    }

    #[tokio::test]
    async fn teardown_actions_have_no_completion() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let service = RejectingService::default();

        let event = execute_action(
            &service,
            SessionAction::Disconnect { session: SessionId::new("s1") },
            &tx,
        )
        .await;

        assert_eq!(event, None);
        assert_eq!(service.disconnects.load(Ordering::SeqCst), 1);
    }
}
