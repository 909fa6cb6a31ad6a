//! Status text derived from a [`StatusSnapshot`].
//!
//! The presenter only draws; deciding which lines to show for each state is
//! done here so it can be tested without a display.

use std::time::Duration;

use crate::session::{ConnectionState, StatusSnapshot};

/// Line height multiplier used for every status line.
pub const LINE_HEIGHT: f32 = 1.2;

/// Font style of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextFormat {
    /// Secondary detail
    Small,
    /// Bold headline
    LargeBold,
}

/// Color of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextColor {
    /// Progress
    White,
    /// Disconnected
    Yellow,
    /// Failure
    Red,
    /// Connected
    Green,
}

/// One line of status text.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    /// Text to display
    pub text: String,
    /// Font style
    pub format: TextFormat,
    /// Color
    pub color: TextColor,
    /// Line spacing relative to the font size
    pub line_height: f32,
}

impl StatusLine {
    /// Line with the default spacing.
    pub fn new(text: impl Into<String>, format: TextFormat, color: TextColor) -> Self {
        Self { text: text.into(), format, color, line_height: LINE_HEIGHT }
    }
}

/// Lines to show for `snapshot` at app time `now`.
///
/// Empty once the model finished loading successfully; the presenter hides
/// the panel in that case.
pub fn status_lines(snapshot: &StatusSnapshot, now: Duration) -> Vec<StatusLine> {
    use TextColor::{Green, Red, White, Yellow};
    use TextFormat::{LargeBold, Small};

    if snapshot.model_load_finished && snapshot.model_load_error.is_none() {
        return Vec::new();
    }

    let mut lines = match snapshot.state {
        ConnectionState::CreatingSession => {
            vec![StatusLine::new("Creating session...", LargeBold, White)]
        },
        ConnectionState::StartingSession => {
            let elapsed = snapshot
                .session_started_at
                .map_or(0, |started| now.saturating_sub(started).as_secs());
            vec![
                StatusLine::new("Starting session...", LargeBold, White),
                StatusLine::new(
                    format!("...this may take a while. Elapsed time: {elapsed}s"),
                    Small,
                    White,
                ),
            ]
        },
        ConnectionState::Connecting => vec![StatusLine::new("Connecting...", LargeBold, White)],
        ConnectionState::Connected => vec![StatusLine::new("Connected", LargeBold, Green)],
        ConnectionState::ConnectionFailed => vec![
            StatusLine::new("Failed to connect", LargeBold, Red),
            StatusLine::new(format!("Error: {}", snapshot.message), LargeBold, Red),
        ],
        ConnectionState::Disconnected => vec![StatusLine::new("Disconnected", LargeBold, Yellow)],
    };

    if snapshot.model_load_triggered {
        match (&snapshot.model_load_error, snapshot.model_load_finished) {
            (Some(error), true) => {
                lines.push(StatusLine::new(format!("Failed to load model: {error}"), LargeBold, Red));
            },
            _ => {
                let percent = (snapshot.model_load_progress * 100.0) as i32;
                lines.push(StatusLine::new(format!("Loading model ({percent}%)"), LargeBold, White));
            },
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: ConnectionState) -> StatusSnapshot {
        StatusSnapshot {
            state,
            message: String::new(),
            session_id: None,
            session_started_at: None,
            model_load_triggered: false,
            model_load_progress: 0.0,
            model_load_finished: false,
            model_load_error: None,
        }
    }

    fn texts(lines: &[StatusLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn headline_per_state() {
        let cases = [
            (ConnectionState::CreatingSession, "Creating session...", TextColor::White),
            (ConnectionState::Connecting, "Connecting...", TextColor::White),
            (ConnectionState::Connected, "Connected", TextColor::Green),
            (ConnectionState::Disconnected, "Disconnected", TextColor::Yellow),
        ];

        for (state, text, color) in cases {
            let lines = status_lines(&snapshot(state), Duration::ZERO);
            assert_eq!(lines, vec![StatusLine::new(text, TextFormat::LargeBold, color)]);
        }
    }

    #[test]
    fn starting_session_shows_elapsed_seconds() {
        let mut snap = snapshot(ConnectionState::StartingSession);
        snap.session_started_at = Some(Duration::from_secs(3));

        let lines = status_lines(&snap, Duration::from_millis(45_900));
        assert_eq!(
            texts(&lines),
            ["Starting session...", "...this may take a while. Elapsed time: 42s"]
        );
        assert_eq!(lines[1].format, TextFormat::Small);
    }

    #[test]
    fn failure_shows_message() {
        let mut snap = snapshot(ConnectionState::ConnectionFailed);
        snap.message = "Session expired".into();

        let lines = status_lines(&snap, Duration::ZERO);
        assert_eq!(texts(&lines), ["Failed to connect", "Error: Session expired"]);
        assert!(lines.iter().all(|l| l.color == TextColor::Red));
    }

    #[test]
    fn model_load_lines() {
        let mut snap = snapshot(ConnectionState::Connected);
        snap.model_load_triggered = true;
        snap.model_load_progress = 0.376;
        assert_eq!(
            texts(&status_lines(&snap, Duration::ZERO)),
            ["Connected", "Loading model (37%)"]
        );

        snap.model_load_finished = true;
        snap.model_load_error = Some("not found".into());
        let lines = status_lines(&snap, Duration::ZERO);
        assert_eq!(lines[1].text, "Failed to load model: not found");
        assert_eq!(lines[1].color, TextColor::Red);
    }

    #[test]
    fn loaded_model_hides_text() {
        let mut snap = snapshot(ConnectionState::Connected);
        snap.model_load_triggered = true;
        snap.model_load_finished = true;
        snap.model_load_progress = 1.0;

        assert!(status_lines(&snap, Duration::ZERO).is_empty());
    }

    #[test]
    fn every_line_uses_shared_spacing() {
        let lines = status_lines(&snapshot(ConnectionState::StartingSession), Duration::ZERO);
        assert!(lines.iter().all(|l| (l.line_height - LINE_HEIGHT).abs() < f32::EPSILON));
    }

    proptest::proptest! {
        #[test]
        fn loading_percent_stays_in_range(progress in 0.0f32..=1.0) {
            let mut snap = snapshot(ConnectionState::Connected);
            snap.model_load_triggered = true;
            snap.model_load_progress = progress;

            let lines = status_lines(&snap, Duration::ZERO);
            let text = &lines[1].text;
            let percent: i32 = text
                .trim_start_matches("Loading model (")
                .trim_end_matches("%)")
                .parse()
                .unwrap();
            proptest::prop_assert!((0..=100).contains(&percent));
        }
    }
}
