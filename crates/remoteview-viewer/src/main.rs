//! Headless remote rendering viewer.
//!
//! Loads the session configuration, drives the session runtime and logs
//! status text instead of drawing it.
//!
//! With a config file the session is managed through the account's REST API:
//! it is created (or reopened), polled until ready and released on exit.
//! Connecting to the session runtime needs the vendor rendering runtime, so a
//! REST-only run ends in `ConnectionFailed` once the session is ready.
//! `--simulate` runs the full lifecycle against the scripted service instead.

mod args;
mod error;
mod headless;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use remoteview_app::{Runtime, SessionService};
use remoteview_client::RestSessionService;
use remoteview_core::{RenderingSessionStatus, SessionConfig, SessionId, config::AccountSettings};
use remoteview_harness::{ServiceScript, SimService};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::{args::Args, error::ViewerError, headless::HeadlessDriver};

#[tokio::main]
async fn main() -> Result<(), ViewerError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let frame_interval = frame_interval(args.frame_rate)?;
    let driver = HeadlessDriver::new(frame_interval, args.max_seconds.map(Duration::from_secs));

    if args.simulate {
        info!(model = %config.model_uri, "viewer starting against the simulated service");
        let service = Arc::new(SimService::new(sim_script(args.sim_starting_polls)));
        run(driver, Arc::clone(&service), config).await?;
        info!(calls = ?service.calls(), "viewer stopped");
    } else {
        info!(account = ?config.account, model = %config.model_uri, "viewer starting");
        let service = Arc::new(RestSessionService::new(config.account.clone())?);
        run(driver, service, config).await?;
        info!("viewer stopped");
    }
    Ok(())
}

async fn run<S: SessionService>(
    driver: HeadlessDriver,
    service: Arc<S>,
    config: SessionConfig,
) -> Result<(), ViewerError> {
    let mut runtime = Runtime::new(driver, service, config);
    runtime.run().await?;
    Ok(())
}

fn load_config(args: &Args) -> Result<SessionConfig, ViewerError> {
    let mut config = match (&args.config, args.simulate) {
        (Some(path), _) => SessionConfig::from_file(path)?,
        (None, true) => SessionConfig::new(AccountSettings::new(
            "00000000-0000-0000-0000-000000000000",
            "simulated",
            "sim.example.com",
        )),
        (None, false) => {
            return Err(ViewerError::InvalidArgument(
                "--config is required unless --simulate is given".into(),
            ));
        },
    };

    if let Some(id) = args.session_id.as_deref().filter(|id| !id.is_empty()) {
        config.session_override = Some(SessionId::new(id));
    }
    if args.stop_on_exit {
        config.stop_session_on_exit = true;
    }
    Ok(config)
}

fn frame_interval(frame_rate: u32) -> Result<Duration, ViewerError> {
    if frame_rate == 0 || frame_rate > 240 {
        return Err(ViewerError::InvalidArgument(format!(
            "frame rate must be between 1 and 240, got {frame_rate}"
        )));
    }
    Ok(Duration::from_secs(1) / frame_rate)
}

fn sim_script(starting_polls: usize) -> ServiceScript {
    let statuses = std::iter::repeat_n(Ok(RenderingSessionStatus::Starting), starting_polls)
        .chain([Ok(RenderingSessionStatus::Ready)]);
    ServiceScript::default().with_properties(statuses)
}
