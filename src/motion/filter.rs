//! # Orientation Filter Module
//!
//! Turns raw accelerometer + gyroscope samples into a smoothed two-axis
//! motion signal.
//!
//! ## Complementary Filter
//!
//! The gyroscope tracks fast rotation but drifts when integrated; the
//! accelerometer gives an absolute tilt reference but is noisy and reacts to
//! linear acceleration. The complementary filter blends the two:
//!
//! ```text
//! gyro_f  = gyro_f + LPF_ALPHA * (gyro - gyro_f)
//! angle   = BLEND * (angle + gyro_f * dt) + (1 - BLEND) * accel_angle
//! ```
//!
//! The output is the estimated tilt in degrees. It is deliberately unscaled;
//! sensitivity belongs to the [`PointerMapper`](super::mapper::PointerMapper).
//!
//! ## Axes
//!
//! With the device lying flat, gravity reads +1 g on Z.
//!
//! - Roll (rotation about X, rate `gyro_x`): `atan2(ay, az)`
//! - Pitch (rotation about Y, rate `gyro_y`): `atan2(-ax, sqrt(ay² + az²))`
//!
//! Tilting right moves the pointer right, tilting forward moves it up.

use serde::Deserialize;

use crate::packet::SensorSample;

/// Substitute `dt` used when the measured interval is implausible (seconds)
pub const DEFAULT_DT: f32 = 0.02;

/// Largest `dt` accepted as genuine (seconds)
pub const MAX_DT: f32 = 0.2;

/// Weight of the gyro-integrated angle in the complementary blend
pub const BLEND: f32 = 0.98;

/// Weight of each new gyro reading in the low-pass filter
pub const LPF_ALPHA: f32 = 0.3;

/// Unscaled two-axis motion produced by an [`OrientationFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSignal {
    pub x: f32,
    pub y: f32,
}

impl MotionSignal {
    /// No motion.
    pub const ZERO: MotionSignal = MotionSignal { x: 0.0, y: 0.0 };

    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Replaces a clock anomaly with [`DEFAULT_DT`].
///
/// Non-positive, non-finite and stalled (> [`MAX_DT`]) intervals would make
/// the integration numerically unstable, so they are never propagated.
///
/// # Examples
///
/// ```
/// use imu_mouse_bridge::motion::filter::{sanitize_dt, DEFAULT_DT};
///
/// assert_eq!(sanitize_dt(0.01), 0.01);
/// assert_eq!(sanitize_dt(0.0), DEFAULT_DT);
/// assert_eq!(sanitize_dt(1.5), DEFAULT_DT);
/// ```
#[inline]
#[must_use]
pub fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt > 0.0 && dt <= MAX_DT {
        dt
    } else {
        DEFAULT_DT
    }
}

/// Estimator turning IMU samples into a motion signal.
///
/// The first `update` after construction or [`reset`](OrientationFilter::reset)
/// is a warm-up: it seeds internal state and returns [`MotionSignal::ZERO`].
pub trait OrientationFilter: Send {
    /// Feed one sample taken `dt` seconds after the previous one.
    fn update(&mut self, sample: &SensorSample, dt: f32) -> MotionSignal;

    /// Forget all state; the next `update` is a warm-up again.
    fn reset(&mut self);
}

/// Selects which [`OrientationFilter`] a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Gyro/accelerometer complementary tilt filter
    #[default]
    Complementary,
    /// Low-passed angular rate, no tilt estimate
    GyroRate,
}

impl FilterKind {
    /// Build a fresh filter of this kind.
    #[must_use]
    pub fn build(self) -> Box<dyn OrientationFilter> {
        match self {
            FilterKind::Complementary => Box::new(ComplementaryFilter::new()),
            FilterKind::GyroRate => Box::new(GyroRateFilter::new()),
        }
    }
}

/// Roll and pitch in degrees derived from the gravity vector
#[inline]
fn accel_tilt(accel: [f32; 3]) -> (f32, f32) {
    let [ax, ay, az] = accel;
    let roll = ay.atan2(az).to_degrees();
    let pitch = (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees();
    (roll, pitch)
}

/// Complementary tilt filter
#[derive(Debug, Clone, Default)]
pub struct ComplementaryFilter {
    initialized: bool,
    /// Estimated roll in degrees
    roll: f32,
    /// Estimated pitch in degrees
    pitch: f32,
    /// Low-passed roll rate (deg/s)
    gx_f: f32,
    /// Low-passed pitch rate (deg/s)
    gy_f: f32,
}

impl ComplementaryFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (roll, pitch) estimate in degrees.
    #[must_use]
    pub fn angles(&self) -> (f32, f32) {
        (self.roll, self.pitch)
    }
}

impl OrientationFilter for ComplementaryFilter {
    fn update(&mut self, sample: &SensorSample, dt: f32) -> MotionSignal {
        let dt = sanitize_dt(dt);
        let (accel_roll, accel_pitch) = accel_tilt(sample.accel);

        if !self.initialized {
            self.roll = accel_roll;
            self.pitch = accel_pitch;
            self.gx_f = sample.gyro[0];
            self.gy_f = sample.gyro[1];
            self.initialized = true;
            return MotionSignal::ZERO;
        }

        self.gx_f += LPF_ALPHA * (sample.gyro[0] - self.gx_f);
        self.gy_f += LPF_ALPHA * (sample.gyro[1] - self.gy_f);

        self.roll = BLEND * (self.roll + self.gx_f * dt) + (1.0 - BLEND) * accel_roll;
        self.pitch = BLEND * (self.pitch + self.gy_f * dt) + (1.0 - BLEND) * accel_pitch;

        MotionSignal::new(self.roll, -self.pitch)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Plain angular-rate filter
///
/// Maps twist (`gyro_z`) to horizontal motion and nod (`gyro_x`) to vertical
/// motion, in deg/s. No drift correction; holding still reads zero.
#[derive(Debug, Clone, Default)]
pub struct GyroRateFilter {
    initialized: bool,
    gx_f: f32,
    gz_f: f32,
}

impl GyroRateFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrientationFilter for GyroRateFilter {
    fn update(&mut self, sample: &SensorSample, _dt: f32) -> MotionSignal {
        if !self.initialized {
            self.gx_f = sample.gyro[0];
            self.gz_f = sample.gyro[2];
            self.initialized = true;
            return MotionSignal::ZERO;
        }

        self.gx_f += LPF_ALPHA * (sample.gyro[0] - self.gx_f);
        self.gz_f += LPF_ALPHA * (sample.gyro[2] - self.gz_f);

        MotionSignal::new(-self.gz_f, -self.gx_f)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
