//! Remote rendering session core logic
//!
//! Pure state machine for connecting a client to a cloud rendering session,
//! completely decoupled from I/O. This enables deterministic testing of the
//! whole connection lifecycle.
//!
//! # Architecture
//!
//! The session machine is isolated from I/O, time and scheduling. The caller
//! supplies elapsed app time to every time-dependent operation.
//!
//! Transitions produce declarative [`session::SessionAction`]s describing the
//! remote calls to make. A runtime (or a test harness) executes them and
//! feeds the completions back as [`session::SessionEvent`]s.
//!
//! # Components
//!
//! - [`session`]: Session state machine (create, poll, connect, model load)
//! - [`status`]: Status text lines derived from a snapshot
//! - [`config`]: Account and session configuration
//! - [`error`]: Failure and error types

pub mod config;
pub mod error;
pub mod session;
pub mod status;

pub use config::SessionConfig;
pub use error::{ModelLoadError, ServiceError, SessionError, SessionFailure};
pub use session::{
    ConnectionState, ConnectionStatus, RenderingSessionStatus, RequestId, Session, SessionAction,
    SessionEvent, SessionId, StatusSnapshot,
};
pub use status::{StatusLine, TextColor, TextFormat, status_lines};
