//! Error types for the session state machine and its collaborators.
//!
//! Remote failures never escape the frame loop as `Err`. They are folded into
//! the state machine as a [`SessionFailure`] (which moves it to
//! `ConnectionFailed`) or a [`ModelLoadError`] (which does not). Only API
//! misuse by the caller is returned as a [`SessionError`].

use thiserror::Error;

use crate::session::{ConnectionState, SessionId};

/// Misuse of the session API by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A session is already being created, started or connected.
    #[error("session request already in progress (state {state:?})")]
    AlreadyInProgress {
        /// State at the time of the rejected request
        state: ConnectionState,
    },

    /// The current session is connected; disconnect before requesting another.
    #[error("already connected to a session")]
    AlreadyConnected,
}

/// Reason the state machine entered `ConnectionFailed`.
///
/// The `Display` output is the human-readable status message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFailure {
    /// Creating or opening the session was rejected by the service.
    #[error("{0}")]
    Creation(String),

    /// The service reported the session in an error state.
    #[error("Session error")]
    SessionError,

    /// The session was stopped before it became ready.
    #[error("Session stopped")]
    Stopped,

    /// The session lease ran out before it became ready.
    #[error("Session expired")]
    Expired,

    /// The property query itself failed.
    #[error("Failed to retrieve session status")]
    StatusQuery(String),

    /// The runtime connection failed or was dropped with an error.
    #[error("{0}")]
    Connection(String),
}

/// A model load finished with a non-success result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load model: {0}")]
pub struct ModelLoadError(pub String);

/// Failure reported by the remote rendering service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service rejected the request.
    #[error("{message} (status {status})")]
    Rejected {
        /// HTTP-style status code
        status: u16,
        /// Vendor error text
        message: String,
    },

    /// The account credentials were not accepted.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The referenced session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The link to the service or runtime was lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The service implementation cannot perform this operation.
    #[error("{0} is not available in this client")]
    Unsupported(&'static str),
}

/// Errors loading a [`crate::config::SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for the expected schema.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    /// A field is present but unusable.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending key
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failures_have_fixed_messages() {
        assert_eq!(SessionFailure::SessionError.to_string(), "Session error");
        assert_eq!(SessionFailure::Stopped.to_string(), "Session stopped");
        assert_eq!(SessionFailure::Expired.to_string(), "Session expired");
        assert_eq!(
            SessionFailure::StatusQuery("503".into()).to_string(),
            "Failed to retrieve session status"
        );
    }

    #[test]
    fn vendor_text_passes_through() {
        let failure = SessionFailure::Creation("quota exceeded".into());
        assert_eq!(failure.to_string(), "quota exceeded");

        let load = ModelLoadError("not found".into());
        assert_eq!(load.to_string(), "Failed to load model: not found");
    }
}
