//! # Output Module
//!
//! Pointer events and the sink that delivers them to the operating system.
//!
//! This module handles:
//! - The [`PointerEvent`] vocabulary produced by the motion pipeline
//! - The [`OutputSink`] seam between the core and the OS input layer
//! - A Linux uinput virtual mouse ([`uinput::UinputMouse`])

pub mod uinput;

use crate::error::Result;
use crate::motion::buttons::MouseButton;

/// One pointer action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    /// Relative pointer motion in pixels
    Move { dx: i32, dy: i32 },
    /// Button press (`pressed = true`) or release
    Button { button: MouseButton, pressed: bool },
    /// Relative wheel motion in notches, positive scrolls up
    Wheel(i32),
}

/// Destination for pointer events
///
/// Implementations deliver one batch per call atomically (a single
/// synchronization report for the whole slice).
#[cfg_attr(test, mockall::automock)]
pub trait OutputSink {
    /// Deliver a batch of events. Empty batches may be skipped.
    fn emit(&mut self, events: &[PointerEvent]) -> Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn emit(&mut self, events: &[PointerEvent]) -> Result<()> {
        (**self).emit(events)
    }
}
