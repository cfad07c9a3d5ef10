//! # Motion Pipeline
//!
//! Runs the frames received in one tick through decode, filter, mapper and
//! button detection and produces the [`PointerEvent`]s for each frame.
//!
//! A pipeline lives for one streaming session. [`MotionPipeline::reset`] at
//! the start of each session drops every piece of carried state so the first
//! tick after a reconnect never jumps.

use serde::Serialize;
use tracing::debug;

use super::buttons::{ButtonEdgeDetector, ButtonEvent, MouseButton};
use super::filter::OrientationFilter;
use super::mapper::PointerMapper;
use crate::config::MotionConfig;
use crate::output::PointerEvent;
use crate::packet::{decode_frames, SensorSample};

/// Per-session diagnostics, logged when the session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Packets decoded successfully
    pub packets: u64,
    /// Packets dropped as malformed
    pub malformed: u64,
    /// Largest gap between consecutive sample timestamps (ms)
    pub largest_gap_ms: u16,
}

/// Result of one successful tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub sample: SensorSample,
    pub events: Vec<PointerEvent>,
}

/// Sample-to-event pipeline for one streaming session
pub struct MotionPipeline {
    filter: Box<dyn OrientationFilter>,
    mapper: PointerMapper,
    buttons: ButtonEdgeDetector,
    /// Button currently pressed on the output device
    held: Option<MouseButton>,
    /// Fractional wheel notches carried between ticks
    wheel_carry: f32,
    last_sample: Option<SensorSample>,
    stats: SessionStats,
}

impl std::fmt::Debug for MotionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionPipeline")
            .field("mapper", &self.mapper)
            .field("buttons", &self.buttons)
            .field("held", &self.held)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl MotionPipeline {
    #[must_use]
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            filter: config.filter.build(),
            mapper: PointerMapper::new(config.scroll_filter_samples),
            buttons: ButtonEdgeDetector::new(),
            held: None,
            wheel_carry: 0.0,
            last_sample: None,
            stats: SessionStats::default(),
        }
    }

    /// Start a fresh session
    ///
    /// Rebuilds the filter from `config.filter`, and clears the accumulator,
    /// scroll window, button phase and statistics. A held button is
    /// forgotten, so call [`release_held`](Self::release_held) first.
    pub fn reset(&mut self, config: &MotionConfig) {
        *self = Self::new(config);
    }

    /// Process every notification drained in one tick
    ///
    /// Notifications may carry several back-to-back frames. `elapsed` is
    /// the wall-clock time the frames cover and is shared evenly between
    /// the frames that decode.
    ///
    /// # Arguments
    ///
    /// * `notifications` - Raw notification payloads, oldest first
    /// * `config` - Session motion settings
    /// * `elapsed` - Seconds covered by these frames, from the caller's clock
    ///
    /// # Returns
    ///
    /// One [`TickOutput`] per decoded frame, in order. Malformed frames are
    /// counted in [`SessionStats::malformed`] and leave filter and mapper
    /// state untouched.
    pub fn process_notifications<B: AsRef<[u8]>>(
        &mut self,
        notifications: &[B],
        config: &MotionConfig,
        elapsed: f32,
    ) -> Vec<TickOutput> {
        let samples: Vec<SensorSample> = notifications
            .iter()
            .flat_map(|bytes| decode_frames(bytes.as_ref()))
            .filter_map(|result| match result {
                Ok(sample) => Some(sample),
                Err(e) => {
                    self.stats.malformed += 1;
                    debug!("Dropping malformed frame: {}", e);
                    None
                }
            })
            .collect();

        if samples.is_empty() {
            return Vec::new();
        }

        let dt = elapsed / samples.len() as f32;
        samples
            .into_iter()
            .map(|sample| {
                let events = self.process_sample(&sample, config, dt);
                TickOutput { sample, events }
            })
            .collect()
    }

    /// Run an already decoded sample through the pipeline
    pub fn process_sample(
        &mut self,
        sample: &SensorSample,
        config: &MotionConfig,
        dt: f32,
    ) -> Vec<PointerEvent> {
        self.stats.packets += 1;
        if let Some(previous) = &self.last_sample {
            let gap = sample.millis_since(previous);
            self.stats.largest_gap_ms = self.stats.largest_gap_ms.max(gap);
        }
        self.last_sample = Some(*sample);

        let mut events = Vec::new();

        if let Some(event) = self.buttons.observe(sample.button_state) {
            self.apply_button(event, &mut events);
        }

        let signal = self.filter.update(sample, dt);
        let (dx, dy) = self.mapper.map(signal, config, dt);
        if dx != 0 || dy != 0 {
            events.push(PointerEvent::Move { dx, dy });
        }

        let scroll = self.mapper.map_scroll(sample.gyro[2], config);
        if let Some(notches) = self.wheel_notches(scroll) {
            events.push(PointerEvent::Wheel(notches));
        }

        events
    }

    /// Release event for a held button, if any
    pub fn release_held(&mut self) -> Option<PointerEvent> {
        self.held.take().map(|button| PointerEvent::Button {
            button,
            pressed: false,
        })
    }

    #[must_use]
    pub fn held(&self) -> Option<MouseButton> {
        self.held
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn apply_button(&mut self, event: ButtonEvent, events: &mut Vec<PointerEvent>) {
        match event {
            ButtonEvent::Pressed(button) | ButtonEvent::LongPressed(button) => {
                if self.held == Some(button) {
                    return;
                }
                if let Some(release) = self.release_held() {
                    events.push(release);
                }
                events.push(PointerEvent::Button {
                    button,
                    pressed: true,
                });
                self.held = Some(button);
            }
            ButtonEvent::Released => {
                if let Some(release) = self.release_held() {
                    events.push(release);
                }
            }
        }
    }

    /// Accumulates wheel speed and returns whole notches
    fn wheel_notches(&mut self, scroll: f32) -> Option<i32> {
        if scroll == 0.0 || !scroll.is_finite() {
            self.wheel_carry = 0.0;
            return None;
        }

        self.wheel_carry += scroll;
        let whole = self.wheel_carry.trunc();
        self.wheel_carry -= whole;

        let notches = whole as i32;
        (notches != 0).then_some(notches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::filter::FilterKind;
    use crate::packet::encode;

    fn config() -> MotionConfig {
        MotionConfig {
            movement_sensitivity: 10.0,
            scroll_sensitivity: 0.01,
            dead_zone: 3.0,
            scroll_threshold: 30.0,
            scroll_filter_samples: 1,
            ..MotionConfig::default()
        }
    }

    /// Device rolled `roll_deg` to the right, otherwise still
    fn rolled(roll_deg: f32, timestamp: u16) -> SensorSample {
        let r = roll_deg.to_radians();
        SensorSample {
            accel: [0.0, r.sin(), r.cos()],
            timestamp,
            ..Default::default()
        }
    }

    fn with_button(button_state: u8, timestamp: u16) -> SensorSample {
        SensorSample {
            button_state,
            timestamp,
            ..Default::default()
        }
    }

    fn moves(events: &[PointerEvent]) -> (i32, i32) {
        events.iter().fold((0, 0), |(x, y), event| match event {
            PointerEvent::Move { dx, dy } => (x + dx, y + dy),
            _ => (x, y),
        })
    }

    // ==================== Movement Tests ====================

    #[test]
    fn test_first_tick_is_still() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        let bytes = encode(&rolled(40.0, 0));
        let outputs = pipeline.process_notifications(&[bytes], &cfg, 0.02);
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].events.is_empty());
    }

    #[test]
    fn test_static_tilt_moves_right() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        let mut total = (0, 0);
        for i in 0..50u16 {
            let bytes = encode(&rolled(30.0, i * 20));
            let outputs = pipeline.process_notifications(&[bytes], &cfg, 0.02);
            let (dx, dy) = moves(&outputs[0].events);
            total = (total.0 + dx, total.1 + dy);
        }
        assert!(total.0 > 0, "expected rightward motion, got {:?}", total);
        assert_eq!(total.1, 0);
    }

    #[test]
    fn test_level_device_stays_put() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        for i in 0..100u16 {
            let events = pipeline.process_sample(&rolled(0.0, i * 20), &cfg, 0.02);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_reset_makes_first_tick_still() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        for i in 0..20u16 {
            pipeline.process_sample(&rolled(45.0, i * 20), &cfg, 0.02);
        }

        pipeline.reset(&cfg);
        let events = pipeline.process_sample(&rolled(45.0, 0), &cfg, 0.02);
        assert_eq!(moves(&events), (0, 0));
        assert_eq!(pipeline.stats().packets, 1);
    }

    #[test]
    fn test_reset_switches_filter_kind() {
        let mut cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        cfg.filter = FilterKind::GyroRate;
        pipeline.reset(&cfg);

        // A static tilt produces no rate, so nothing moves
        for i in 0..20u16 {
            let events = pipeline.process_sample(&rolled(45.0, i * 20), &cfg, 0.02);
            assert_eq!(moves(&events), (0, 0));
        }
    }

    // ==================== Malformed Packet Tests ====================

    #[test]
    fn test_malformed_packet_is_counted_and_dropped() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);

        let outputs = pipeline.process_notifications(&[[0u8; 7]], &cfg, 0.02);
        assert!(outputs.is_empty());

        let stats = pipeline.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.packets, 0);
    }

    #[test]
    fn test_malformed_packet_leaves_filter_untouched() {
        let cfg = config();
        let mut clean = MotionPipeline::new(&cfg);
        let mut noisy = MotionPipeline::new(&cfg);

        for i in 0..30u16 {
            let bytes = encode(&rolled(25.0, i * 20));
            let expected = clean.process_notifications(&[&bytes[..]], &cfg, 0.02);

            let actual = noisy.process_notifications(&[&bytes[..10], &bytes[..]], &cfg, 0.02);
            assert_eq!(expected, actual);
        }
        assert_eq!(noisy.stats().malformed, 30);
    }

    #[test]
    fn test_coalesced_frames_are_all_processed() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);

        let mut buffer = encode(&with_button(1, 0)).to_vec();
        buffer.extend_from_slice(&encode(&with_button(0, 20)));

        let outputs = pipeline.process_notifications(&[buffer], &cfg, 0.04);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].sample.timestamp, 0);
        assert_eq!(outputs[1].sample.timestamp, 20);
        assert_eq!(
            outputs[1].events,
            vec![PointerEvent::Button { button: MouseButton::Left, pressed: false }]
        );
        assert_eq!(pipeline.stats().packets, 2);
        assert_eq!(pipeline.stats().malformed, 0);
    }

    #[test]
    fn test_trailing_fragment_counted_as_malformed() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);

        let mut buffer = encode(&rolled(0.0, 0)).to_vec();
        buffer.extend_from_slice(&[1, 2, 3]);

        let outputs = pipeline.process_notifications(&[buffer], &cfg, 0.02);
        assert_eq!(outputs.len(), 1);
        assert_eq!(pipeline.stats().packets, 1);
        assert_eq!(pipeline.stats().malformed, 1);
    }

    #[test]
    fn test_elapsed_shared_across_frames() {
        let cfg = config();
        let mut steady = MotionPipeline::new(&cfg);
        let mut batched = MotionPipeline::new(&cfg);

        let frames: Vec<_> = (0..100u16).map(|i| encode(&rolled(30.0, i * 20))).collect();

        let mut steady_dx = 0;
        for frame in &frames {
            for output in steady.process_notifications(&[frame], &cfg, 0.02) {
                steady_dx += moves(&output.events).0;
            }
        }

        let mut batched_dx = 0;
        for pair in frames.chunks(2) {
            for output in batched.process_notifications(pair, &cfg, 0.04) {
                batched_dx += moves(&output.events).0;
            }
        }

        assert!(steady_dx > 0);
        assert_eq!(steady_dx, batched_dx);
    }

    // ==================== Button Tests ====================

    #[test]
    fn test_click_press_and_release() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);

        let events = pipeline.process_sample(&with_button(1, 0), &cfg, 0.02);
        assert_eq!(
            events,
            vec![PointerEvent::Button { button: MouseButton::Left, pressed: true }]
        );
        assert_eq!(pipeline.held(), Some(MouseButton::Left));

        assert!(pipeline.process_sample(&with_button(1, 20), &cfg, 0.02).is_empty());

        let events = pipeline.process_sample(&with_button(0, 40), &cfg, 0.02);
        assert_eq!(
            events,
            vec![PointerEvent::Button { button: MouseButton::Left, pressed: false }]
        );
        assert_eq!(pipeline.held(), None);
    }

    #[test]
    fn test_short_to_long_swaps_buttons() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);

        pipeline.process_sample(&with_button(1, 0), &cfg, 0.02);
        let events = pipeline.process_sample(&with_button(2, 20), &cfg, 0.02);
        assert_eq!(
            events,
            vec![
                PointerEvent::Button { button: MouseButton::Left, pressed: false },
                PointerEvent::Button { button: MouseButton::Right, pressed: true },
            ]
        );

        let events = pipeline.process_sample(&with_button(0, 40), &cfg, 0.02);
        assert_eq!(
            events,
            vec![PointerEvent::Button { button: MouseButton::Right, pressed: false }]
        );
    }

    #[test]
    fn test_release_held() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        assert_eq!(pipeline.release_held(), None);

        pipeline.process_sample(&with_button(2, 0), &cfg, 0.02);
        assert_eq!(
            pipeline.release_held(),
            Some(PointerEvent::Button { button: MouseButton::Right, pressed: false })
        );
        assert_eq!(pipeline.release_held(), None);
    }

    // ==================== Scroll Tests ====================

    #[test]
    fn test_sustained_twist_scrolls() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        let sample = SensorSample {
            gyro: [0.0, 0.0, 100.0],
            ..Default::default()
        };

        // 100 deg/s * 0.01 = one notch per tick
        let mut notches = 0;
        for _ in 0..10 {
            for event in pipeline.process_sample(&sample, &cfg, 0.02) {
                if let PointerEvent::Wheel(n) = event {
                    notches += n;
                }
            }
        }
        assert!(notches >= 9, "got {} notches", notches);
    }

    #[test]
    fn test_gentle_twist_does_not_scroll() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        let sample = SensorSample {
            gyro: [0.0, 0.0, 20.0],
            ..Default::default()
        };
        for _ in 0..50 {
            let events = pipeline.process_sample(&sample, &cfg, 0.02);
            assert!(!events.iter().any(|e| matches!(e, PointerEvent::Wheel(_))));
        }
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_largest_gap_is_wrap_aware() {
        let cfg = config();
        let mut pipeline = MotionPipeline::new(&cfg);
        pipeline.process_sample(&with_button(0, 65_530), &cfg, 0.02);
        pipeline.process_sample(&with_button(0, 14), &cfg, 0.02);
        pipeline.process_sample(&with_button(0, 34), &cfg, 0.02);

        let stats = pipeline.stats();
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.largest_gap_ms, 20);
    }
}
