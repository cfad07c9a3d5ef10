//! # IMU Mouse Bridge Library
//!
//! Turn a wireless inertial-measurement peripheral into a Linux pointer.
//!
//! This library provides the core functionality for bridging tilt, twist and
//! button packets from the peripheral to relative pointer motion, wheel and
//! button events on a uinput virtual mouse.

pub mod config;
pub mod error;
pub mod link;
pub mod motion;
pub mod output;
pub mod packet;
pub mod shutdown;
pub mod telemetry;
