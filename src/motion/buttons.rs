//! # Button Edge Detector Module
//!
//! The firmware reports the button level in every packet:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Not pressed |
//! | 1 | Short press (first report of a press) |
//! | 2 | Long press (button still held) |
//!
//! A held button therefore arrives as `1, 2, 2, ..., 0`. The detector turns
//! these levels into edge events so repeated identical codes emit nothing.
//!
//! | From | Code | To | Event |
//! |------|------|----|-------|
//! | Idle | 1 | ShortPressed | `Pressed(Left)` |
//! | Idle | 2 | LongPressed | `Pressed(Right)` |
//! | ShortPressed | 2 | LongPressed | `LongPressed(Right)` |
//! | LongPressed | 1 | ShortPressed | `Pressed(Left)` |
//! | ShortPressed / LongPressed | 0 | Idle | `Released` |

use crate::packet::protocol::{BUTTON_LONG, BUTTON_NONE, BUTTON_SHORT};

/// Physical pointer buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

/// Edge events produced by [`ButtonEdgeDetector::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// A press began
    Pressed(MouseButton),
    /// Whatever button is held was let go
    Released,
    /// A short press turned into a long press
    LongPressed(MouseButton),
}

/// Current phase of the button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonPhase {
    #[default]
    Idle,
    ShortPressed,
    LongPressed,
}

/// Converts button codes into press/release edges.
///
/// # Examples
///
/// ```
/// use imu_mouse_bridge::motion::buttons::{ButtonEdgeDetector, ButtonEvent, MouseButton};
///
/// let mut detector = ButtonEdgeDetector::new();
/// let events: Vec<_> = [0, 1, 1, 1, 0]
///     .into_iter()
///     .filter_map(|code| detector.observe(code))
///     .collect();
/// assert_eq!(events, vec![ButtonEvent::Pressed(MouseButton::Left), ButtonEvent::Released]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ButtonEdgeDetector {
    phase: ButtonPhase,
}

impl ButtonEdgeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> ButtonPhase {
        self.phase
    }

    /// Back to `Idle` without emitting anything.
    pub fn reset(&mut self) {
        self.phase = ButtonPhase::Idle;
    }

    /// Feeds one button code, returning an event on a transition.
    ///
    /// Codes other than 0, 1 and 2 are ignored.
    pub fn observe(&mut self, button_state: u8) -> Option<ButtonEvent> {
        use ButtonPhase::*;

        let (next, event) = match (self.phase, button_state) {
            (Idle, BUTTON_SHORT) => (ShortPressed, Some(ButtonEvent::Pressed(MouseButton::Left))),
            (Idle, BUTTON_LONG) => (LongPressed, Some(ButtonEvent::Pressed(MouseButton::Right))),
            (ShortPressed, BUTTON_LONG) => {
                (LongPressed, Some(ButtonEvent::LongPressed(MouseButton::Right)))
            }
            (LongPressed, BUTTON_SHORT) => {
                (ShortPressed, Some(ButtonEvent::Pressed(MouseButton::Left)))
            }
            (ShortPressed | LongPressed, BUTTON_NONE) => (Idle, Some(ButtonEvent::Released)),
            (phase, _) => (phase, None),
        };

        self.phase = next;
        event
    }
}
