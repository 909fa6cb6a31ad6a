//! REST client for remote rendering session management.
//!
//! Implements [`remoteview_app::SessionService`] on top of the account's
//! token service and the session management REST API.
//!
//! # Architecture
//!
//! ```text
//! RestSessionService
//!     ├─ TokenCache ──> GET  sts.{domain}/accounts/{id}/token
//!     └─ Endpoints  ──> PUT  .../sessions/{session}      create
//!                       GET  .../sessions/{session}      properties, open
//!                       POST .../sessions/{session}/:stop
//! ```
//!
//! Connecting to the runtime and loading models go through the vendor
//! rendering runtime, not REST, and are reported as
//! [`remoteview_core::ServiceError::Unsupported`].
//!
//! # Components
//!
//! - [`endpoints`]: URL construction for an account
//! - [`rest`]: The [`RestSessionService`]
//! - `token`: Access token caching

pub mod endpoints;
mod error;
pub mod rest;
mod token;

pub use endpoints::{API_VERSION, Endpoints};
pub use error::ClientError;
pub use rest::RestSessionService;
