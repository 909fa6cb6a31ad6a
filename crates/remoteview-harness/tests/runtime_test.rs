//! Runtime integration tests.
//!
//! Drives the real [`Runtime`] with the scripted service and the
//! virtual-time driver:
//! - Full lifecycle through spawned service calls
//! - Remote disconnects pushed by the service
//! - Teardown on exit and on driver failure

use std::{sync::Arc, time::Duration};

use remoteview_app::{Driver, Runtime, RuntimeError};
use remoteview_core::{
    ConnectionState, RenderingSessionStatus, ServiceError, SessionConfig, SessionId,
    config::{AccountSettings, DEFAULT_MODEL_URI},
};
use remoteview_harness::{ServiceScript, SimDriver, SimService};

fn config() -> SessionConfig {
    SessionConfig::new(AccountSettings::new("account", "key", "sim.example.com"))
}

fn runtime(
    script: ServiceScript,
    config: SessionConfig,
    duration: Duration,
) -> (Runtime<SimDriver, SimService>, Arc<SimService>) {
    let service = Arc::new(SimService::new(script));
    let runtime = Runtime::new(SimDriver::for_duration(duration), Arc::clone(&service), config);
    (runtime, service)
}

/// Run frames until `state` is reached or the driver runs out of frames.
async fn run_until_state(runtime: &mut Runtime<SimDriver, SimService>, state: ConnectionState) {
    while runtime.driver_mut().next_frame().await.unwrap() {
        runtime.frame();
        if runtime.session().state() == state {
            return;
        }
    }
    panic!("never reached {state:?}, stuck in {:?}", runtime.session().state());
}

#[tokio::test]
async fn run_connects_loads_and_releases() {
    let (mut runtime, service) =
        runtime(ServiceScript::default(), config(), Duration::from_secs(30));

    runtime.run().await.unwrap();

    let calls = service.calls();
    assert_eq!(calls.create, 1);
    assert_eq!(calls.properties, 2, "one Starting and one Ready answer");
    assert_eq!(calls.connect, 1);
    assert_eq!(calls.load, 1);
    assert_eq!(calls.disconnect, 1, "session released on exit");
    assert_eq!(calls.stop, 0);

    assert_eq!(service.loaded_models(), [DEFAULT_MODEL_URI]);
    assert_eq!(service.released_sessions(), [SessionId::new("sim-session-1")]);

    let driver = runtime.driver();
    assert!(driver.is_stopped());
    assert!(driver.showed("Starting session..."));
    assert!(driver.showed("Connected"));
    assert!(!driver.is_text_visible(), "text hidden once the model loaded");
    assert_eq!(runtime.session().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn model_loads_once_across_frames() {
    let (mut runtime, service) =
        runtime(ServiceScript::default(), config(), Duration::from_secs(60));

    run_until_state(&mut runtime, ConnectionState::Connected).await;
    for _ in 0..120 {
        runtime.driver_mut().next_frame().await.unwrap();
        runtime.frame();
    }

    assert_eq!(service.calls().load, 1);
    assert!(runtime.session().model_load_finished());
    assert_eq!(runtime.session().model_load_error(), None);
}

#[tokio::test]
async fn first_query_waits_one_interval() {
    let (mut runtime, service) = runtime(
        ServiceScript::default().ready_immediately(),
        config(),
        Duration::from_secs(30),
    );
    runtime.request_new_session().unwrap();

    run_until_state(&mut runtime, ConnectionState::StartingSession).await;
    while runtime.elapsed() < Duration::from_millis(9_900) {
        runtime.driver_mut().next_frame().await.unwrap();
        runtime.frame();
    }
    assert_eq!(service.calls().properties, 0);

    run_until_state(&mut runtime, ConnectionState::Connecting).await;
    assert_eq!(service.calls().properties, 1);
}

#[tokio::test]
async fn service_side_disconnect() {
    let (mut runtime, service) =
        runtime(ServiceScript::default(), config(), Duration::from_secs(60));
    runtime.request_new_session().unwrap();
    run_until_state(&mut runtime, ConnectionState::Connected).await;

    assert!(service.force_disconnect(Err(ServiceError::ConnectionLost("reset".into()))));
    run_until_state(&mut runtime, ConnectionState::ConnectionFailed).await;

    assert_eq!(runtime.session().message(), "connection lost: reset");
    assert!(!runtime.session().is_connected());
    assert!(runtime.driver().showed("Error: connection lost: reset"));
}

#[tokio::test]
async fn retry_after_expiry_releases_old_session() {
    let script = ServiceScript::default().with_properties([
        Ok(RenderingSessionStatus::Expired),
        Ok(RenderingSessionStatus::Ready),
    ]);
    let (mut runtime, service) = runtime(script, config(), Duration::from_secs(60));
    runtime.request_new_session().unwrap();

    run_until_state(&mut runtime, ConnectionState::ConnectionFailed).await;
    assert_eq!(runtime.session().message(), "Session expired");

    runtime.request_new_session().unwrap();
    run_until_state(&mut runtime, ConnectionState::Connected).await;

    assert_eq!(service.calls().create, 2);
    assert_eq!(service.released_sessions(), [SessionId::new("sim-session-1")]);
    assert_eq!(runtime.session().session_id(), Some(&SessionId::new("sim-session-2")));
}

#[tokio::test]
async fn stop_session_on_exit() {
    let mut config = config();
    config.stop_session_on_exit = true;
    let (mut runtime, service) = runtime(ServiceScript::default(), config, Duration::from_secs(30));

    runtime.run().await.unwrap();

    assert_eq!(service.stopped_sessions(), [SessionId::new("sim-session-1")]);
    assert_eq!(service.calls().disconnect, 1);
}

#[tokio::test]
async fn driver_failure_still_releases_session() {
    let service = Arc::new(SimService::new(ServiceScript::default()));
    let driver = SimDriver::for_duration(Duration::from_secs(30)).fail_at(120);
    let mut runtime = Runtime::new(driver, Arc::clone(&service), config());

    let result = runtime.run().await;

    assert!(matches!(result, Err(RuntimeError::Driver(e)) if e.frame == 120));
    assert!(runtime.driver().is_stopped());
    assert_eq!(service.calls().disconnect, 1);
}

#[tokio::test]
async fn creation_failure_is_presented() {
    let script = ServiceScript::default().fail_create(ServiceError::AuthenticationFailed);
    let (mut runtime, service) = runtime(script, config(), Duration::from_secs(5));
    runtime.request_new_session().unwrap();

    run_until_state(&mut runtime, ConnectionState::ConnectionFailed).await;
    runtime.driver_mut().next_frame().await.unwrap();
    runtime.frame();

    assert_eq!(
        runtime.driver().current_text(),
        Some(vec!["Failed to connect".to_string(), "Error: authentication failed".to_string()])
    );
    assert_eq!(service.calls().properties, 0);
}
