//! Frame loop without a display.
//!
//! Frames are paced by a tokio interval. Status text goes to the log, one
//! entry per change, and Ctrl-C or the optional deadline ends the loop.

use std::{io, time::Duration};

use remoteview_app::{Driver, StatusPresenter};
use remoteview_core::StatusLine;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// [`Driver`] that logs status text instead of drawing it.
pub struct HeadlessDriver {
    interval: Interval,
    deadline: Option<Instant>,
    shown: Option<Vec<String>>,
    stopped: bool,
}

impl HeadlessDriver {
    /// Pace frames every `frame_interval`, ending after `run_for` if given.
    pub fn new(frame_interval: Duration, run_for: Option<Duration>) -> Self {
        let mut interval = tokio::time::interval(frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            deadline: run_for.map(|d| Instant::now() + d),
            shown: None,
            stopped: false,
        }
    }

    /// Text currently shown, `None` while hidden.
    #[cfg(test)]
    pub fn shown(&self) -> Option<&[String]> {
        self.shown.as_deref()
    }
}

impl StatusPresenter for HeadlessDriver {
    fn set_lines(&mut self, lines: &[StatusLine]) {
        let text: Vec<String> = lines.iter().map(|line| line.text.clone()).collect();
        if self.shown.as_ref() == Some(&text) {
            return;
        }
        info!(status = %text.join(" | "), "status");
        self.shown = Some(text);
    }

    fn clear_lines(&mut self) {
        if self.shown.take().is_some() {
            debug!("status text hidden");
        }
    }
}

impl Driver for HeadlessDriver {
    type Error = io::Error;
    type Instant = Instant;

    async fn next_frame(&mut self) -> Result<bool, io::Error> {
        if self.stopped || self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(false);
        }

        tokio::select! {
            _ = self.interval.tick() => Ok(true),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted");
                Ok(false)
            },
        }
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.clear_lines();
    }
}
