//! Scenario testing with mandatory oracles.
//!
//! A scenario scripts the service, runs the session for a span of virtual
//! time with optional scheduled interventions, and then verifies the final
//! [`World`] with an oracle. A scenario cannot run without one.
//!
//! ```text
//! Scenario::new("name")
//!     .script(..)            // service responses
//!     .at(t, Intervention)   // remote disconnect, new request, shutdown
//!     .run_for(duration)
//!     .oracle(..)            // mandatory
//!     .run()
//! ```

mod builder;
pub mod oracle;
mod world;

pub use builder::{Intervention, RunnableScenario, Scenario};
pub use world::World;

/// Verification run against the world after a scenario completes.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
