//! # Motion Module
//!
//! Turns decoded sensor samples into pointer events.
//!
//! ## Stages
//!
//! - [`filter`]: tilt estimate from accelerometer and gyroscope
//! - [`mapper`]: dead zone, sensitivity, sub-pixel carry and clamping
//! - [`buttons`]: button codes to press/release edges
//! - [`pipeline`]: runs the stages once per packet

pub mod buttons;
pub mod filter;
pub mod mapper;
pub mod pipeline;

pub use buttons::{ButtonEdgeDetector, ButtonEvent, MouseButton};
pub use filter::{FilterKind, MotionSignal, OrientationFilter};
pub use mapper::PointerMapper;
pub use pipeline::{MotionPipeline, SessionStats, TickOutput};
