//! # Pointer Mapper Module
//!
//! Converts the unscaled [`MotionSignal`] into integer pointer deltas and
//! the scroll-axis reading into a smoothed wheel signal.
//!
//! ## Movement
//!
//! Per tick, in order:
//!
//! 1. Dead zone: each axis with `|v| < dead_zone` is zeroed
//! 2. `accumulator += v * movement_sensitivity * dt`
//! 3. The integer part of the accumulator becomes the delta; the fraction
//!    is carried to the next tick (sub-pixel carry)
//! 4. Axis inversion
//! 5. Clamp to ±[`MAX_STEP`]
//!
//! Without the carry, slow motion at low sensitivity would truncate to zero
//! every tick and the pointer would never move.
//!
//! ## Scroll
//!
//! Raw scroll readings go through a [`ScrollFilterBuffer`] (moving average).
//! The mean is emitted only past `scroll_threshold`.

use std::collections::VecDeque;

use super::filter::{sanitize_dt, MotionSignal};
use crate::config::MotionConfig;

/// Largest pointer step per tick on either axis.
pub const MAX_STEP: i32 = 50;

/// Bounds for the scroll smoothing window.
pub const MIN_SCROLL_SAMPLES: usize = 1;
pub const MAX_SCROLL_SAMPLES: usize = 10;

/// Fixed-capacity moving-average window for scroll readings
#[derive(Debug, Clone)]
pub struct ScrollFilterBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl ScrollFilterBuffer {
    /// Creates an empty buffer. `capacity` is clamped to 1..=10.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_SCROLL_SAMPLES, MAX_SCROLL_SAMPLES);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Changes the window size, dropping the oldest readings if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.clamp(MIN_SCROLL_SAMPLES, MAX_SCROLL_SAMPLES);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Adds a reading, evicting the oldest when full.
    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Mean of the buffered readings, 0.0 when empty.
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Maps motion and scroll signals to pointer output.
///
/// Owns the sub-pixel accumulator and the scroll window. Call
/// [`reset`](PointerMapper::reset) whenever a new streaming session starts.
///
/// # Examples
///
/// ```
/// use imu_mouse_bridge::config::MotionConfig;
/// use imu_mouse_bridge::motion::filter::MotionSignal;
/// use imu_mouse_bridge::motion::mapper::PointerMapper;
///
/// let cfg = MotionConfig::default();
/// let mut mapper = PointerMapper::new(cfg.scroll_filter_samples);
///
/// // Below the dead zone nothing moves
/// let still = MotionSignal::new(cfg.dead_zone / 2.0, 0.0);
/// assert_eq!(mapper.map(still, &cfg, 0.02), (0, 0));
/// ```
#[derive(Debug, Clone)]
pub struct PointerMapper {
    /// Fractional x carry, |acc_x| < 1 after every tick
    acc_x: f32,
    /// Fractional y carry, |acc_y| < 1 after every tick
    acc_y: f32,
    scroll: ScrollFilterBuffer,
}

impl PointerMapper {
    #[must_use]
    pub fn new(scroll_filter_samples: usize) -> Self {
        Self {
            acc_x: 0.0,
            acc_y: 0.0,
            scroll: ScrollFilterBuffer::new(scroll_filter_samples),
        }
    }

    /// Leftover sub-pixel motion `(x, y)`.
    #[must_use]
    pub fn residual(&self) -> (f32, f32) {
        (self.acc_x, self.acc_y)
    }

    /// Drops carried motion and scroll history.
    pub fn reset(&mut self) {
        self.acc_x = 0.0;
        self.acc_y = 0.0;
        self.scroll.clear();
    }

    /// Maps one tick of motion to an integer pointer delta.
    ///
    /// # Arguments
    ///
    /// * `signal` - Filter output for this tick
    /// * `cfg` - Session motion settings
    /// * `dt` - Seconds since the previous tick (anomalies are substituted)
    ///
    /// # Returns
    ///
    /// `(dx, dy)`, each within ±[`MAX_STEP`]
    pub fn map(&mut self, signal: MotionSignal, cfg: &MotionConfig, dt: f32) -> (i32, i32) {
        let dt = sanitize_dt(dt);

        let x = apply_dead_zone(signal.x, cfg.dead_zone);
        let y = apply_dead_zone(signal.y, cfg.dead_zone);

        self.acc_x += step(x, cfg.movement_sensitivity, dt);
        self.acc_y += step(y, cfg.movement_sensitivity, dt);

        let whole_x = self.acc_x.trunc();
        let whole_y = self.acc_y.trunc();
        self.acc_x -= whole_x;
        self.acc_y -= whole_y;

        let mut dx = whole_x as i32;
        let mut dy = whole_y as i32;
        if cfg.invert_x {
            dx = -dx;
        }
        if cfg.invert_y {
            dy = -dy;
        }

        (dx.clamp(-MAX_STEP, MAX_STEP), dy.clamp(-MAX_STEP, MAX_STEP))
    }

    /// Smooths one raw scroll-axis reading.
    ///
    /// # Returns
    ///
    /// Wheel speed for this tick: `mean * scroll_sensitivity` (negated when
    /// `invert_scroll`) once `|mean|` exceeds `scroll_threshold`, otherwise 0.0
    pub fn map_scroll(&mut self, raw: f32, cfg: &MotionConfig) -> f32 {
        if self.scroll.capacity() != cfg.scroll_filter_samples {
            self.scroll.set_capacity(cfg.scroll_filter_samples);
        }
        self.scroll.push(raw);

        let mean = self.scroll.mean();
        if mean.abs() <= cfg.scroll_threshold {
            return 0.0;
        }

        let scroll = mean * cfg.scroll_sensitivity;
        if cfg.invert_scroll {
            -scroll
        } else {
            scroll
        }
    }
}

/// One tick's contribution, bounded so the accumulator stays finite
#[inline]
fn step(value: f32, sensitivity: f32, dt: f32) -> f32 {
    let limit = MAX_STEP as f32;
    let step = value * sensitivity * dt;
    if step.is_nan() {
        0.0
    } else {
        step.clamp(-limit, limit)
    }
}

#[inline]
fn apply_dead_zone(value: f32, dead_zone: f32) -> f32 {
    if value.abs() < dead_zone || !value.is_finite() {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MotionConfig {
        MotionConfig {
            movement_sensitivity: 2.0,
            scroll_sensitivity: 0.5,
            dead_zone: 1.0,
            scroll_threshold: 10.0,
            invert_x: false,
            invert_y: false,
            invert_scroll: false,
            scroll_filter_samples: 3,
            ..MotionConfig::default()
        }
    }

    // ==================== Dead Zone Tests ====================

    #[test]
    fn test_below_dead_zone_never_moves() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        for _ in 0..1000 {
            let delta = mapper.map(MotionSignal::new(0.99, -0.99), &cfg, 0.02);
            assert_eq!(delta, (0, 0));
        }
        assert_eq!(mapper.residual(), (0.0, 0.0));
    }

    #[test]
    fn test_dead_zone_is_per_axis() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        // 55 * 2.0 * 0.02 = 2.2 px on X only
        let delta = mapper.map(MotionSignal::new(55.0, 0.5), &cfg, 0.02);
        assert_eq!(delta, (2, 0));
    }

    #[test]
    fn test_non_finite_signal_is_ignored() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        assert_eq!(mapper.map(MotionSignal::new(f32::NAN, f32::INFINITY), &cfg, 0.02), (0, 0));
    }

    // ==================== Accumulation Tests ====================

    #[test]
    fn test_sub_pixel_carry_accumulates() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        // 5 * 2.0 * 0.02 = 0.2 px per tick: moves one pixel every 5 ticks
        let mut total = 0;
        for _ in 0..50 {
            let (dx, _) = mapper.map(MotionSignal::new(5.0, 0.0), &cfg, 0.02);
            total += dx;
        }
        assert!((total - 10).abs() <= 1, "total was {}", total);
    }

    #[test]
    fn test_accumulation_round_trip_law() {
        let cfg = config();
        let signals = [
            MotionSignal::new(3.3, -7.7),
            MotionSignal::new(-12.5, 1.25),
            MotionSignal::new(100.0, -40.0),
        ];
        let dt = 0.02;

        for signal in signals {
            let mut mapper = PointerMapper::new(3);
            let ticks = 500;
            let (mut sum_x, mut sum_y) = (0i64, 0i64);

            for _ in 0..ticks {
                let (dx, dy) = mapper.map(signal, &cfg, dt);
                sum_x += dx as i64;
                sum_y += dy as i64;

                let (rx, ry) = mapper.residual();
                assert!(rx.abs() < 1.0 && ry.abs() < 1.0);
            }

            let expected_x = ticks as f32 * signal.x * cfg.movement_sensitivity * dt;
            let expected_y = ticks as f32 * signal.y * cfg.movement_sensitivity * dt;
            assert!((sum_x as f32 - expected_x).abs() <= 1.0, "x: {} vs {}", sum_x, expected_x);
            assert!((sum_y as f32 - expected_y).abs() <= 1.0, "y: {} vs {}", sum_y, expected_y);
        }
    }

    #[test]
    fn test_reset_clears_residual() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        mapper.map(MotionSignal::new(22.0, 22.0), &cfg, 0.02); // 0.88 px carry
        assert!(mapper.residual().0 > 0.5);

        mapper.reset();
        assert_eq!(mapper.residual(), (0.0, 0.0));
        assert_eq!(mapper.map(MotionSignal::ZERO, &cfg, 0.02), (0, 0));
    }

    // ==================== Inversion and Clamp Tests ====================

    #[test]
    fn test_inversion() {
        let mut cfg = config();
        cfg.invert_x = true;
        cfg.invert_y = true;
        let mut mapper = PointerMapper::new(3);
        let delta = mapper.map(MotionSignal::new(110.0, -110.0), &cfg, 0.02);
        assert_eq!(delta, (-4, 4));
    }

    #[test]
    fn test_output_is_clamped() {
        let mut cfg = config();
        cfg.movement_sensitivity = 1000.0;
        let mut mapper = PointerMapper::new(3);
        for magnitude in [60.0_f32, 1e3, 1e6, 1e20] {
            let (dx, dy) = mapper.map(MotionSignal::new(magnitude, -magnitude), &cfg, 0.2);
            assert!(dx.abs() <= MAX_STEP && dy.abs() <= MAX_STEP);
            assert_eq!((dx, dy), (MAX_STEP, -MAX_STEP));
        }
    }

    #[test]
    fn test_huge_sensitivity_keeps_accumulator_finite() {
        let mut cfg = config();
        cfg.movement_sensitivity = f32::MAX;
        let mut mapper = PointerMapper::new(3);

        for _ in 0..3 {
            let delta = mapper.map(MotionSignal::new(90.0, -90.0), &cfg, 0.2);
            assert_eq!(delta, (MAX_STEP, -MAX_STEP));
            let (rx, ry) = mapper.residual();
            assert!(rx.is_finite() && ry.is_finite());
        }

        // The axis still responds afterwards
        cfg.movement_sensitivity = 2.0;
        assert_eq!(mapper.map(MotionSignal::new(-50.0, 0.0), &cfg, 0.02), (-2, 0));
    }

    #[test]
    fn test_invalid_dt_uses_default() {
        let cfg = config();
        let mut a = PointerMapper::new(3);
        let mut b = PointerMapper::new(3);
        let signal = MotionSignal::new(100.0, 0.0);
        assert_eq!(a.map(signal, &cfg, -1.0), b.map(signal, &cfg, 0.02));
    }

    // ==================== Scroll Tests ====================

    #[test]
    fn test_scroll_below_threshold_is_zero() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        assert_eq!(mapper.map_scroll(9.0, &cfg), 0.0);
        assert_eq!(mapper.map_scroll(-10.0, &cfg), 0.0);
    }

    #[test]
    fn test_scroll_uses_moving_average() {
        let cfg = config();
        let mut mapper = PointerMapper::new(3);
        // A single spike is averaged down below the threshold
        assert_eq!(mapper.map_scroll(0.0, &cfg), 0.0);
        assert_eq!(mapper.map_scroll(0.0, &cfg), 0.0);
        assert_eq!(mapper.map_scroll(27.0, &cfg), 0.0);

        // Sustained twist passes: mean of [0, 27, 30] = 19
        let scroll = mapper.map_scroll(30.0, &cfg);
        assert!((scroll - 9.5).abs() < 1e-5);
    }

    #[test]
    fn test_scroll_inversion() {
        let mut cfg = config();
        cfg.invert_scroll = true;
        cfg.scroll_filter_samples = 1;
        let mut mapper = PointerMapper::new(1);
        assert!((mapper.map_scroll(20.0, &cfg) - (-10.0)).abs() < 1e-5);
    }

    #[test]
    fn test_scroll_window_follows_config() {
        let mut cfg = config();
        cfg.scroll_filter_samples = 1;
        let mut mapper = PointerMapper::new(10);
        mapper.map_scroll(0.0, &cfg);
        // Window of one: the previous zero no longer dilutes the mean
        assert!((mapper.map_scroll(20.0, &cfg) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_scroll_buffer_capacity_is_clamped() {
        assert_eq!(ScrollFilterBuffer::new(0).capacity(), 1);
        assert_eq!(ScrollFilterBuffer::new(25).capacity(), 10);

        let mut buffer = ScrollFilterBuffer::new(4);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            buffer.push(v);
        }
        assert_eq!(buffer.len(), 4);
        assert!((buffer.mean() - 3.5).abs() < 1e-6);

        buffer.set_capacity(2);
        assert_eq!(buffer.len(), 2);
        assert!((buffer.mean() - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_scroll_buffer_mean() {
        let buffer = ScrollFilterBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.mean(), 0.0);
    }
}
