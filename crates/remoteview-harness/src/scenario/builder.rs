//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use remoteview_core::{ServiceError, SessionConfig, config::AccountSettings};
use tracing::debug;

use crate::{
    scenario::{OracleFn, World},
    script::ServiceScript,
};

/// Default simulated frame step (60 frames per second).
const DEFAULT_FRAME_STEP: Duration = Duration::from_micros(16_667);

/// Something that happens to the session at a scheduled time.
#[derive(Debug, Clone, PartialEq)]
pub enum Intervention {
    /// The runtime drops the connection with this result
    RemoteDisconnect(Result<(), ServiceError>),
    /// The app asks for a new session (may be rejected)
    RequestNewSession,
    /// The app shuts down
    Shutdown,
}

/// Scenario builder.
///
/// Script the service, schedule interventions and choose how long to run.
/// Must call `.oracle()` to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    config: SessionConfig,
    script: ServiceScript,
    frame_step: Duration,
    duration: Duration,
    latency: Option<(u64, u32)>,
    interventions: Vec<(Duration, Intervention)>,
}

impl Scenario {
    /// Create a scenario with default configuration and script.
    ///
    /// Runs for 30 seconds of virtual time unless changed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: SessionConfig::new(AccountSettings::new(
                "00000000-0000-0000-0000-000000000000",
                "sim-key",
                "sim.example.com",
            )),
            script: ServiceScript::default(),
            frame_step: DEFAULT_FRAME_STEP,
            duration: Duration::from_secs(30),
            latency: None,
            interventions: Vec::new(),
        }
    }

    /// Use a custom session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Script the service responses.
    pub fn script(mut self, script: ServiceScript) -> Self {
        self.script = script;
        self
    }

    /// Set the simulated frame step.
    pub fn frame_step(mut self, step: Duration) -> Self {
        self.frame_step = step;
        self
    }

    /// Run for `duration` of virtual time.
    pub fn run_for(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Delay completions by up to `max_frames` frames, seeded for replay.
    pub fn latency(mut self, seed: u64, max_frames: u32) -> Self {
        self.latency = Some((seed, max_frames));
        self
    }

    /// Schedule an intervention at virtual time `at`.
    pub fn at(mut self, at: Duration, intervention: Intervention) -> Self {
        self.interventions.push((at, intervention));
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// 1. Request a session at time zero
    /// 2. Run frames until the scenario duration, applying each intervention
    ///    on the first frame at or after its time
    /// 3. Run the oracle against the final world
    pub fn run(self) -> Result<(), String> {
        let Self { scenario, oracle } = self;
        if scenario.frame_step.is_zero() {
            return Err(format!("Scenario '{}': frame step must be non-zero", scenario.name));
        }

        let mut world = World::new(scenario.config, scenario.script, scenario.frame_step);
        if let Some((seed, max_frames)) = scenario.latency {
            world.set_latency(seed, max_frames);
        }

        world
            .request_new_session()
            .map_err(|e| format!("Scenario '{}': initial request failed: {e}", scenario.name))?;

        let mut interventions = scenario.interventions;
        interventions.sort_by_key(|(at, _)| *at);
        let mut interventions = interventions.into_iter().peekable();

        while world.now() < scenario.duration {
            while let Some((_, intervention)) =
                interventions.next_if(|(at, _)| *at <= world.now())
            {
                apply(&mut world, intervention);
            }
            world.step();
        }

        oracle(&world).map_err(|e| format!("Scenario '{}': {e}", scenario.name))
    }
}

fn apply(world: &mut World, intervention: Intervention) {
    match intervention {
        Intervention::RemoteDisconnect(result) => {
            world.force_disconnect(result);
        },
        Intervention::RequestNewSession => {
            // Rejections are recorded in the world for the oracle.
            if let Err(error) = world.request_new_session() {
                debug!(%error, "scenario request rejected");
            }
        },
        Intervention::Shutdown => world.shutdown(),
    }
}
