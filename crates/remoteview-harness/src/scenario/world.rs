//! World state for scenario execution.
//!
//! The World owns one session state machine and a scripted, synchronous model
//! of the rendering service. It executes the machine's actions immediately,
//! queues their completions (optionally with seeded latency so completions
//! of different requests overtake each other) and records everything the
//! oracles need.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use remoteview_core::{
    ConnectionState, ConnectionStatus, ServiceError, Session, SessionAction, SessionConfig,
    SessionError, SessionEvent, SessionId, StatusLine, status_lines,
};

use crate::script::ServiceScript;

/// A completion waiting to be delivered.
#[derive(Debug, Clone)]
struct Pending {
    deliver_at: Duration,
    seq: u64,
    event: SessionEvent,
}

/// World state containing the session, the simulated service and metrics.
pub struct World {
    session: Session,
    config: SessionConfig,
    script: ServiceScript,
    now: Duration,
    frame_step: Duration,
    pending: Vec<Pending>,
    next_seq: u64,
    latency: Option<(ChaCha8Rng, u32)>,
    create_calls: usize,
    property_calls: usize,
    connected_session: Option<SessionId>,
    actions: Vec<(Duration, SessionAction)>,
    states: Vec<ConnectionState>,
    presented: Vec<Vec<StatusLine>>,
    rejected_requests: Vec<SessionError>,
}

impl World {
    /// Create a world at time zero.
    pub fn new(config: SessionConfig, script: ServiceScript, frame_step: Duration) -> Self {
        Self {
            session: Session::new(),
            config,
            script,
            now: Duration::ZERO,
            frame_step,
            pending: Vec::new(),
            next_seq: 0,
            latency: None,
            create_calls: 0,
            property_calls: 0,
            connected_session: None,
            actions: Vec::new(),
            states: vec![ConnectionState::Disconnected],
            presented: Vec::new(),
            rejected_requests: Vec::new(),
        }
    }

    /// Delay each batch of completions by up to `max_frames` frames, drawn
    /// from a generator seeded with `seed`.
    pub fn set_latency(&mut self, seed: u64, max_frames: u32) {
        self.latency = Some((ChaCha8Rng::seed_from_u64(seed), max_frames));
    }

    /// The session state machine.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Configured polling interval.
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Every action the machine issued, with the time it was issued.
    pub fn actions(&self) -> &[(Duration, SessionAction)] {
        &self.actions
    }

    /// Times at which property queries were issued.
    pub fn query_times(&self) -> Vec<Duration> {
        self.actions
            .iter()
            .filter(|(_, a)| matches!(a, SessionAction::QueryProperties { .. }))
            .map(|(t, _)| *t)
            .collect()
    }

    /// Number of issued actions matching `predicate`.
    pub fn count_actions(&self, predicate: impl Fn(&SessionAction) -> bool) -> usize {
        self.actions.iter().filter(|(_, a)| predicate(a)).count()
    }

    /// Distinct states in the order they were entered.
    pub fn states(&self) -> &[ConnectionState] {
        &self.states
    }

    /// Every presented set of status lines. An empty entry hides the text.
    pub fn presented(&self) -> &[Vec<StatusLine>] {
        &self.presented
    }

    /// Requests rejected by the machine.
    pub fn rejected_requests(&self) -> &[SessionError] {
        &self.rejected_requests
    }

    /// Completions not yet delivered.
    pub fn pending_completions(&self) -> usize {
        self.pending.len()
    }

    /// Request a new session with the world's configuration.
    pub fn request_new_session(&mut self) -> Result<(), SessionError> {
        match self.session.request_new_session(&self.config, self.now) {
            Ok(actions) => {
                self.execute(actions);
                self.record_state();
                Ok(())
            },
            Err(e) => {
                self.rejected_requests.push(e.clone());
                Err(e)
            },
        }
    }

    /// Run one frame: deliver due completions, poll, tick, present.
    pub fn frame(&mut self) {
        let now = self.now;

        let mut due: Vec<Pending> = Vec::new();
        let mut waiting = Vec::new();
        for pending in self.pending.drain(..) {
            if pending.deliver_at <= now {
                due.push(pending);
            } else {
                waiting.push(pending);
            }
        }
        self.pending = waiting;
        due.sort_by_key(|p| (p.deliver_at, p.seq));

        let mut actions = Vec::new();
        for pending in due {
            actions.extend(self.session.handle(pending.event, now));
            self.record_state();
        }

        actions.extend(self.session.poll_session_status(now));
        actions.extend(self.session.tick(now));
        self.execute(actions);
        self.record_state();

        if let Some(snapshot) = self.session.take_status_update() {
            self.presented.push(status_lines(&snapshot, now));
        }
    }

    /// Advance virtual time by `duration`.
    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }

    /// Run a frame, then advance one frame step.
    pub fn step(&mut self) {
        self.frame();
        self.advance(self.frame_step);
    }

    /// Run frames until `deadline`.
    pub fn run_until(&mut self, deadline: Duration) {
        while self.now < deadline {
            self.step();
        }
    }

    /// Drop the runtime connection from the service side.
    ///
    /// Returns `false` if nothing is connected.
    pub fn force_disconnect(&mut self, result: Result<(), ServiceError>) -> bool {
        let Some(session) = self.connected_session.take() else {
            return false;
        };
        let event = SessionEvent::ConnectionStatusChanged {
            session,
            status: ConnectionStatus::Disconnected,
            result,
        };
        self.enqueue(vec![event]);
        true
    }

    /// Tear the session down as the app would on exit.
    pub fn shutdown(&mut self) {
        let actions = self.session.shutdown();
        self.execute(actions);
        self.record_state();
    }

    fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            self.actions.push((self.now, action.clone()));
            let completions = self.respond(action);
            if !completions.is_empty() {
                self.enqueue(completions);
            }
        }
    }

    /// Scripted service behavior for one action.
    fn respond(&mut self, action: SessionAction) -> Vec<SessionEvent> {
        match action {
            SessionAction::CreateSession { request, .. } => {
                let created = self.script.created_session(self.create_calls);
                self.create_calls += 1;
                vec![match created {
                    Ok(session) => SessionEvent::SessionReady { request, session },
                    Err(error) => SessionEvent::SessionCreationFailed { request, error },
                }]
            },
            SessionAction::OpenSession { request, session } => {
                vec![match self.script.create.clone() {
                    Ok(_) => SessionEvent::SessionReady { request, session },
                    Err(error) => SessionEvent::SessionCreationFailed { request, error },
                }]
            },
            SessionAction::QueryProperties { request, .. } => {
                let result = self.script.property_response(self.property_calls);
                self.property_calls += 1;
                vec![SessionEvent::PropertiesReceived { request, result }]
            },
            SessionAction::ConnectToRuntime { session, .. } => {
                let connecting = SessionEvent::ConnectionStatusChanged {
                    session: session.clone(),
                    status: ConnectionStatus::Connecting,
                    result: Ok(()),
                };
                let outcome = match self.script.connect.clone() {
                    Ok(()) => {
                        self.connected_session = Some(session.clone());
                        SessionEvent::ConnectionStatusChanged {
                            session,
                            status: ConnectionStatus::Connected,
                            result: Ok(()),
                        }
                    },
                    Err(error) => SessionEvent::ConnectionStatusChanged {
                        session,
                        status: ConnectionStatus::Disconnected,
                        result: Err(error),
                    },
                };
                vec![connecting, outcome]
            },
            SessionAction::LoadModel { request, .. } => {
                let mut events: Vec<SessionEvent> = self
                    .script
                    .load_progress
                    .iter()
                    .map(|&progress| SessionEvent::ModelLoadProgress { request, progress })
                    .collect();
                events.push(SessionEvent::ModelLoadCompleted {
                    request,
                    result: self.script.load.clone(),
                });
                events
            },
            SessionAction::Disconnect { session } | SessionAction::StopSession { session } => {
                if self.connected_session.as_ref() == Some(&session) {
                    self.connected_session = None;
                }
                Vec::new()
            },
        }
    }

    /// Queue one batch; events within a batch keep their order.
    fn enqueue(&mut self, events: Vec<SessionEvent>) {
        let delay = match &mut self.latency {
            Some((rng, max_frames)) => self.frame_step * rng.gen_range(0..=*max_frames),
            None => Duration::ZERO,
        };
        let deliver_at = self.now + delay;

        for event in events {
            self.pending.push(Pending { deliver_at, seq: self.next_seq, event });
            self.next_seq += 1;
        }
    }

    fn record_state(&mut self) {
        let state = self.session.state();
        if self.states.last() != Some(&state) {
            self.states.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use remoteview_core::config::AccountSettings;

    use super::*;

    fn world(script: ServiceScript) -> World {
        let config = SessionConfig::new(AccountSettings::new("id", "key", "domain"));
        World::new(config, script, Duration::from_millis(100))
    }

    #[test]
    fn completions_wait_for_next_frame() {
        let mut world = world(ServiceScript::default());
        world.request_new_session().unwrap();

        assert_eq!(world.session().state(), ConnectionState::CreatingSession);
        assert_eq!(world.pending_completions(), 1);

        world.step();
        assert_eq!(world.session().state(), ConnectionState::StartingSession);
    }

    #[test]
    fn latency_delays_completions() {
        let mut world = world(ServiceScript::default());
        world.set_latency(7, 20);
        world.request_new_session().unwrap();

        world.run_until(Duration::from_secs(3));
        assert_eq!(world.session().state(), ConnectionState::StartingSession);
        assert_eq!(world.pending_completions(), 0);
    }

    #[test]
    fn force_disconnect_requires_connection() {
        let mut world = world(ServiceScript::default());
        assert!(!world.force_disconnect(Ok(())));
    }
}
