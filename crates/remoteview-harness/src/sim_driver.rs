//! Virtual-time frame loop for runtime tests.
//!
//! Each frame advances a virtual clock by a fixed step and yields to the
//! executor so spawned service calls complete between frames. Presented
//! status lines are captured for assertions.

use std::{ops::Sub, time::Duration};

use remoteview_app::{Driver, StatusPresenter};
use remoteview_core::StatusLine;
use thiserror::Error;

/// Yields per frame; enough for a spawned call and its notifications.
const YIELDS_PER_FRAME: usize = 4;

/// Virtual time instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Injected frame loop failure.
#[derive(Debug, Error)]
#[error("frame loop failed at frame {frame}")]
pub struct SimDriverError {
    /// Frame that failed
    pub frame: u64,
}

/// [`Driver`] with a virtual clock and a frame budget.
#[derive(Debug)]
pub struct SimDriver {
    now: SimInstant,
    frame_step: Duration,
    frames: u64,
    max_frames: u64,
    fail_at: Option<u64>,
    presented: Vec<Vec<StatusLine>>,
    text_visible: bool,
    stopped: bool,
}

impl SimDriver {
    /// Driver running `max_frames` frames of `frame_step` each.
    pub fn new(frame_step: Duration, max_frames: u64) -> Self {
        Self {
            now: SimInstant::default(),
            frame_step,
            frames: 0,
            max_frames,
            fail_at: None,
            presented: Vec::new(),
            text_visible: false,
            stopped: false,
        }
    }

    /// Driver running for `duration` of virtual time at 60 frames per second.
    pub fn for_duration(duration: Duration) -> Self {
        let step = Duration::from_micros(16_667);
        let frames = duration.as_micros() / step.as_micros();
        Self::new(step, frames as u64)
    }

    /// Fail `next_frame` once `frame` frames have run.
    pub fn fail_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    /// Frames run so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Every presented set of lines, oldest first. An empty entry is a clear.
    pub fn presented(&self) -> &[Vec<StatusLine>] {
        &self.presented
    }

    /// Text of the lines currently shown, if the text is visible.
    pub fn current_text(&self) -> Option<Vec<String>> {
        if !self.text_visible {
            return None;
        }
        self.presented.last().map(|lines| lines.iter().map(|l| l.text.clone()).collect())
    }

    /// Whether any presented line had exactly `text`.
    pub fn showed(&self, text: &str) -> bool {
        self.presented.iter().flatten().any(|l| l.text == text)
    }

    /// Whether status text is visible.
    pub fn is_text_visible(&self) -> bool {
        self.text_visible
    }

    /// Whether the runtime stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl StatusPresenter for SimDriver {
    fn set_lines(&mut self, lines: &[StatusLine]) {
        self.presented.push(lines.to_vec());
        self.text_visible = true;
    }

    fn clear_lines(&mut self) {
        self.presented.push(Vec::new());
        self.text_visible = false;
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn next_frame(&mut self) -> Result<bool, Self::Error> {
        if self.fail_at == Some(self.frames) {
            return Err(SimDriverError { frame: self.frames });
        }
        if self.stopped || self.frames >= self.max_frames {
            return Ok(false);
        }

        for _ in 0..YIELDS_PER_FRAME {
            tokio::task::yield_now().await;
        }

        self.now = SimInstant(self.now.0 + self.frame_step);
        self.frames += 1;
        Ok(true)
    }

    fn now(&self) -> SimInstant {
        self.now
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
