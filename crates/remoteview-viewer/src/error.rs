use std::io;

use remoteview_app::RuntimeError;
use remoteview_client::ClientError;
use remoteview_core::error::ConfigError;
use thiserror::Error;

/// Errors that end the viewer.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// The session configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The REST client could not be set up.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The session runtime failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError<io::Error>),

    /// A command line value is missing or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
