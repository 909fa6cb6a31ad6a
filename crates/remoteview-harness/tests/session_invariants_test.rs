//! Property tests over random operation sequences.
//!
//! Generates random scripts, latencies and operation sequences (frames, time
//! jumps, requests, remote disconnects, shutdowns) and checks that the
//! session invariants hold after every operation.
//!
//! # Invariants
//!
//! - Property queries are at least one poll interval apart
//! - `is_connected` implies `Connected`
//! - A finished model load was triggered
//! - `ConnectionFailed` always carries a failure message
//! - `ConnectionFailed` is only left by a new request (or shutdown)
//! - At most one model load per connection
//! - A rejected request emits no action

use std::time::Duration;

use proptest::prelude::*;
use remoteview_core::{
    ConnectionState, RenderingSessionStatus, ServiceError, SessionAction, SessionConfig,
    config::AccountSettings,
};
use remoteview_harness::{ServiceScript, scenario::World};

const FRAME: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone)]
enum Operation {
    Frames { count: u8 },
    AdvanceTime { millis: u32 },
    RequestNewSession,
    RemoteDisconnect { clean: bool },
    Shutdown,
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        8 => (1..120u8).prop_map(|count| Operation::Frames { count }),
        3 => (0..25_000u32).prop_map(|millis| Operation::AdvanceTime { millis }),
        2 => Just(Operation::RequestNewSession),
        1 => any::<bool>().prop_map(|clean| Operation::RemoteDisconnect { clean }),
        1 => Just(Operation::Shutdown),
    ]
}

fn status_strategy() -> impl Strategy<Value = Result<RenderingSessionStatus, ServiceError>> {
    prop_oneof![
        6 => Just(Ok(RenderingSessionStatus::Starting)),
        6 => Just(Ok(RenderingSessionStatus::Ready)),
        1 => Just(Ok(RenderingSessionStatus::Unknown)),
        1 => Just(Ok(RenderingSessionStatus::Error)),
        1 => Just(Ok(RenderingSessionStatus::Stopped)),
        1 => Just(Ok(RenderingSessionStatus::Expired)),
        1 => Just(Err(ServiceError::Timeout)),
    ]
}

fn script_strategy() -> impl Strategy<Value = ServiceScript> {
    (
        prop::collection::vec(status_strategy(), 1..8),
        prop::bool::weighted(0.9),
        prop::bool::weighted(0.9),
        prop::bool::weighted(0.8),
    )
        .prop_map(|(properties, create_ok, connect_ok, load_ok)| {
            let mut script = ServiceScript::default().with_properties(properties);
            if !create_ok {
                script = script.fail_create(ServiceError::AuthenticationFailed);
            }
            if !connect_ok {
                script = script.fail_connect(ServiceError::Timeout);
            }
            if !load_ok {
                script = script.fail_load(ServiceError::ConnectionLost("load".into()));
            }
            script
        })
}

fn world(script: ServiceScript, poll_secs: u64, latency: Option<(u64, u32)>) -> World {
    let mut config = SessionConfig::new(AccountSettings::new("id", "key", "domain"));
    config.poll_interval = Duration::from_secs(poll_secs);

    let mut world = World::new(config, script, FRAME);
    if let Some((seed, max_frames)) = latency {
        world.set_latency(seed, max_frames);
    }
    world
}

fn apply(world: &mut World, op: &Operation) {
    match op {
        Operation::Frames { count } => {
            for _ in 0..*count {
                world.step();
            }
        },
        Operation::AdvanceTime { millis } => world.advance(Duration::from_millis(u64::from(*millis))),
        Operation::RequestNewSession => {
            if world.request_new_session().is_err() {
                assert!(!world.rejected_requests().is_empty());
            }
        },
        Operation::RemoteDisconnect { clean } => {
            let result =
                if *clean { Ok(()) } else { Err(ServiceError::ConnectionLost("reset".into())) };
            world.force_disconnect(result);
        },
        Operation::Shutdown => world.shutdown(),
    }
}

fn check_invariants(world: &World) -> Result<(), TestCaseError> {
    let session = world.session();

    let interval = world.poll_interval();
    for pair in world.query_times().windows(2) {
        prop_assert!(
            pair[1] - pair[0] >= interval,
            "queries at {:?} and {:?} closer than {:?}",
            pair[0],
            pair[1],
            interval
        );
    }

    if session.is_connected() {
        prop_assert_eq!(session.state(), ConnectionState::Connected);
    }

    if session.model_load_finished() {
        prop_assert!(session.model_load_triggered());
    }

    if session.state() == ConnectionState::ConnectionFailed {
        prop_assert!(session.failure().is_some());
        prop_assert!(!session.message().is_empty());
    }

    let progress = session.model_load_progress();
    prop_assert!((0.0..=1.0).contains(&progress), "progress {} out of range", progress);

    let connections =
        world.states().iter().filter(|s| **s == ConnectionState::Connected).count();
    let loads = world.count_actions(|a| matches!(a, SessionAction::LoadModel { .. }));
    prop_assert!(loads <= connections, "{} loads for {} connections", loads, connections);

    Ok(())
}

/// States entered since `from` must leave `ConnectionFailed` only for
/// `CreatingSession`, or for `Disconnected` on shutdown.
fn check_failed_exits(world: &World, from: usize, op: &Operation) -> Result<(), TestCaseError> {
    let states = &world.states()[from.saturating_sub(1)..];
    for pair in states.windows(2) {
        if pair[0] != ConnectionState::ConnectionFailed {
            continue;
        }
        let allowed = pair[1] == ConnectionState::CreatingSession
            || (matches!(op, Operation::Shutdown) && pair[1] == ConnectionState::Disconnected);
        prop_assert!(allowed, "left ConnectionFailed for {:?} during {:?}", pair[1], op);
    }
    Ok(())
}

proptest! {
    /// Invariants hold after every operation of any sequence.
    #[test]
    fn prop_session_invariants(
        script in script_strategy(),
        poll_secs in 1..15u64,
        latency in prop::option::of((any::<u64>(), 0..40u32)),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut world = world(script, poll_secs, latency);
        world.request_new_session().unwrap();
        check_invariants(&world)?;

        for op in &ops {
            let from = world.states().len();
            apply(&mut world, op);
            check_invariants(&world)?;
            check_failed_exits(&world, from, op)?;
        }
    }

    /// A request rejected in a busy state emits no action.
    #[test]
    fn prop_rejected_request_is_inert(
        frames in 0..2_000usize,
        script in script_strategy(),
    ) {
        let mut world = world(script, 10, None);
        world.request_new_session().unwrap();
        for _ in 0..frames {
            world.step();
        }

        let before = world.actions().len();
        let state = world.session().state();
        if world.request_new_session().is_err() {
            prop_assert_eq!(world.actions().len(), before);
            prop_assert_eq!(world.session().state(), state);
        } else {
            prop_assert!(matches!(
                state,
                ConnectionState::Disconnected | ConnectionState::ConnectionFailed
            ));
        }
    }

    /// With a ready service the session always connects and loads once.
    #[test]
    fn prop_ready_service_connects(
        seed in any::<u64>(),
        max_frames in 0..60u32,
        poll_secs in 1..15u64,
    ) {
        let script = ServiceScript::default().ready_immediately();
        let mut world = world(script, poll_secs, Some((seed, max_frames)));
        world.request_new_session().unwrap();

        world.run_until(Duration::from_secs(poll_secs + 5));

        prop_assert_eq!(world.session().state(), ConnectionState::Connected);
        prop_assert!(world.session().model_load_finished());
        prop_assert_eq!(
            world.count_actions(|a| matches!(a, SessionAction::LoadModel { .. })),
            1
        );
    }
}
