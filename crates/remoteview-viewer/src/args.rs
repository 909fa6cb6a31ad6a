use std::path::PathBuf;

use clap::Parser;

/// `remoteview` - headless remote rendering session viewer.
///
/// Creates (or reopens) a rendering session through the account's REST API
/// and waits for it to start. With `--simulate` the whole lifecycle, including
/// the runtime connection and model load, runs against a scripted service.
/// Status text is written to the log.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON session configuration.
    ///
    /// Required unless `--simulate` is given.
    #[arg(long, env = "REMOTEVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run against the scripted in-process service instead of the REST API.
    #[arg(long)]
    pub simulate: bool,

    /// Reopen this session instead of creating a new one.
    #[arg(long, env = "REMOTEVIEW_SESSION_ID")]
    pub session_id: Option<String>,

    /// Frames per second of the headless loop.
    #[arg(long, default_value_t = 60)]
    pub frame_rate: u32,

    /// Exit after this many seconds; runs until interrupted otherwise.
    #[arg(long)]
    pub max_seconds: Option<u64>,

    /// Stop the remote session on exit instead of only disconnecting.
    #[arg(long)]
    pub stop_on_exit: bool,

    /// With `--simulate`: number of "starting" answers before the session is
    /// ready.
    #[arg(long, default_value_t = 1)]
    pub sim_starting_polls: usize,
}
