//! Application layer for remote rendering clients
//!
//! Generic runtime that drives the pure session state machine from a frame
//! loop, enabling deterministic simulation testing with the same code that
//! runs in production.
//!
//! # Components
//!
//! - [`Runtime`]: Per-frame orchestration (completion queue, action execution)
//! - [`Driver`]: Trait for the platform frame loop and clock
//! - [`StatusPresenter`]: Trait for drawing status text
//! - [`SessionService`]: Trait for the remote rendering service

mod driver;
mod runtime;
mod service;

pub use driver::{Driver, StatusPresenter};
pub use runtime::{Runtime, RuntimeError, execute_action};
pub use service::{ConnectionNotifier, ProgressNotifier, SessionService};
