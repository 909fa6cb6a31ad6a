//! Deterministic simulation harness for remote rendering session testing.
//!
//! Scripted implementations of the service and driver traits for
//! reproducible testing of the session lifecycle, plus a synchronous
//! scenario framework with seeded completion latency.
//!
//! # Components
//!
//! - [`SimService`]: Scripted [`remoteview_app::SessionService`]
//! - [`SimDriver`]: Virtual-time [`remoteview_app::Driver`]
//! - [`ServiceScript`]: Responses shared by both simulations
//! - [`scenario`]: Scenario builder with mandatory oracles

pub mod scenario;
pub mod script;
pub mod sim_driver;
pub mod sim_service;

pub use script::ServiceScript;
pub use sim_driver::{SimDriver, SimDriverError, SimInstant};
pub use sim_service::{CallCounts, SimService};
