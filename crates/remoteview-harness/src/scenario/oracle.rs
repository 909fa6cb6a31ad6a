//! Reusable oracles for scenario verification.

use remoteview_core::{ConnectionState, SessionAction};

use crate::scenario::{OracleFn, World};

/// All oracles must pass; the first failure is reported.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world: &World| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// The session ends in `expected`.
pub fn final_state(expected: ConnectionState) -> OracleFn {
    Box::new(move |world: &World| {
        let state = world.session().state();
        if state == expected {
            Ok(())
        } else {
            Err(format!("expected final state {expected:?}, got {state:?}"))
        }
    })
}

/// The session failed with exactly `message`.
pub fn failed_with(message: &'static str) -> OracleFn {
    Box::new(move |world: &World| {
        let session = world.session();
        if session.state() != ConnectionState::ConnectionFailed {
            return Err(format!("expected ConnectionFailed, got {:?}", session.state()));
        }
        if session.message() != message {
            return Err(format!("expected message {message:?}, got {:?}", session.message()));
        }
        Ok(())
    })
}

/// The session passed through `Connected` at some point.
pub fn reached_connected() -> OracleFn {
    Box::new(|world: &World| {
        if world.states().contains(&ConnectionState::Connected) {
            Ok(())
        } else {
            Err(format!("never connected, visited {:?}", world.states()))
        }
    })
}

/// Exactly `expected` model loads were issued.
pub fn model_loads(expected: usize) -> OracleFn {
    Box::new(move |world: &World| {
        let loads = world.count_actions(|a| matches!(a, SessionAction::LoadModel { .. }));
        if loads == expected {
            Ok(())
        } else {
            Err(format!("expected {expected} model loads, got {loads}"))
        }
    })
}

/// Consecutive property queries are at least one poll interval apart.
pub fn query_spacing_respected() -> OracleFn {
    Box::new(|world: &World| {
        let interval = world.poll_interval();
        world.query_times().windows(2).try_for_each(|pair| {
            let gap = pair[1].saturating_sub(pair[0]);
            if gap >= interval {
                Ok(())
            } else {
                Err(format!("property queries {gap:?} apart, interval is {interval:?}"))
            }
        })
    })
}

/// Status text is hidden after the last presentation.
pub fn status_text_hidden() -> OracleFn {
    Box::new(|world: &World| match world.presented().last() {
        Some(lines) if lines.is_empty() => Ok(()),
        Some(lines) => Err(format!("status text still shown: {lines:?}")),
        None => Err("nothing was presented".to_string()),
    })
}

/// Some presented line had exactly `text`.
pub fn showed_line(text: &'static str) -> OracleFn {
    Box::new(move |world: &World| {
        if world.presented().iter().flatten().any(|l| l.text == text) {
            Ok(())
        } else {
            Err(format!("line {text:?} was never presented"))
        }
    })
}
