//! Driver trait for abstracting the frame loop and status display.
//!
//! The [`Driver`] trait decouples the session runtime from the platform's
//! render loop. Each frontend implements it (a headless loop, a simulation
//! with a virtual clock), while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use remoteview_core::StatusLine;

/// Draws status text on top of the rendered scene.
pub trait StatusPresenter {
    /// Replace the displayed lines and make the text visible.
    fn set_lines(&mut self, lines: &[StatusLine]);

    /// Remove all lines and hide the text.
    fn clear_lines(&mut self);
}

/// Abstracts the frame loop for the session runtime.
///
/// Implementations pace frames and supply time, while the generic
/// [`crate::Runtime`] drives the session. This ensures the same
/// orchestration code runs in production and simulation.
pub trait Driver: StatusPresenter + Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Wait for the next frame.
    ///
    /// Returns `false` when the loop should end.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform loop fails.
    fn next_frame(&mut self) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Tear down the display and release resources.
    fn stop(&mut self);
}
