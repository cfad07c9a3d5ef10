//! # Link Module
//!
//! Owns the connection lifecycle and drives the motion pipeline while
//! streaming.
//!
//! ## Lifecycle
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Idle | start | Scanning |
//! | Scanning | matching advertisement | Found |
//! | Scanning | nothing found, scan error | Retrying (scan backoff) |
//! | Found | | Connecting |
//! | Connecting | connected, settled, subscribed | Streaming |
//! | Connecting | any failure | Retrying (connect backoff) |
//! | Streaming | tick | Streaming |
//! | Streaming | link lost, shutdown | Disconnecting |
//! | Disconnecting | | Retrying (reconnect delay), or Idle on shutdown |
//! | Retrying | backoff elapsed | Idle |
//!
//! Every wait races the [`ShutdownToken`]; once shutdown is requested the
//! machine winds down to `Idle` and stops.

pub mod simulated;
pub mod state;
pub mod transport;

#[cfg(feature = "ble")]
pub mod ble;

pub use state::{DeviceHandle, LinkState};
pub use transport::{Advertisement, GattTarget, Transport, TransportError};

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{LinkConfig, MotionConfig};
use crate::motion::MotionPipeline;
use crate::output::{OutputSink, PointerEvent};
use crate::shutdown::ShutdownToken;
use crate::telemetry::SampleRecorder;

/// Connection lifecycle driver
///
/// # Examples
///
/// ```no_run
/// use imu_mouse_bridge::config::Config;
/// use imu_mouse_bridge::link::simulated::SimulatedTransport;
/// use imu_mouse_bridge::link::LinkStateMachine;
/// use imu_mouse_bridge::output::uinput::UinputMouse;
/// use imu_mouse_bridge::shutdown;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let sink = UinputMouse::create(&config.output)?;
/// let (_trigger, token) = shutdown::channel();
///
/// let mut machine = LinkStateMachine::new(
///     SimulatedTransport::new(None),
///     sink,
///     config.link,
///     config.motion,
///     token,
/// );
/// machine.run().await;
/// # Ok(())
/// # }
/// ```
pub struct LinkStateMachine<T, S> {
    state: LinkState,
    transport: T,
    sink: S,
    link: LinkConfig,
    target: GattTarget,
    motion: MotionConfig,
    motion_updates: Option<watch::Receiver<MotionConfig>>,
    pipeline: MotionPipeline,
    recorder: Option<SampleRecorder>,
    shutdown: ShutdownToken,
    /// Device picked by the last scan
    device: Option<DeviceHandle>,
    /// Backoff applied by the next `Retrying` step
    retry_delay: Duration,
    ticker: Option<Interval>,
    last_tick: Option<Instant>,
    stopped: bool,
}

impl<T: Transport, S: OutputSink> LinkStateMachine<T, S> {
    pub fn new(
        transport: T,
        sink: S,
        link: LinkConfig,
        motion: MotionConfig,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            state: LinkState::Idle,
            transport,
            sink,
            target: GattTarget::from_config(&link),
            retry_delay: link.scan_retry_delay(),
            link,
            pipeline: MotionPipeline::new(&motion),
            motion,
            motion_updates: None,
            recorder: None,
            shutdown,
            device: None,
            ticker: None,
            last_tick: None,
            stopped: false,
        }
    }

    /// Motion settings published here are applied at the next session start
    pub fn with_motion_updates(mut self, updates: watch::Receiver<MotionConfig>) -> Self {
        self.motion_updates = Some(updates);
        self
    }

    pub fn with_recorder(mut self, recorder: SampleRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// True once the machine has wound down after a shutdown request
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Motion settings of the current (or last) session
    pub fn motion_config(&self) -> &MotionConfig {
        &self.motion
    }

    /// Leave `Idle` and begin scanning
    pub fn start(&mut self) -> &LinkState {
        if self.state == LinkState::Idle && !self.stopped {
            self.transition(LinkState::Scanning);
        }
        &self.state
    }

    /// Run until shutdown is requested and the link is torn down
    pub async fn run(&mut self) {
        self.start();
        while !self.stopped {
            self.step().await;
        }
        info!("Link state machine stopped");
    }

    /// Perform exactly one transition and return the new state
    pub async fn step(&mut self) -> &LinkState {
        if self.stopped {
            return &self.state;
        }

        let next = if self.shutdown.is_requested() {
            self.step_shutdown().await
        } else {
            match self.state.clone() {
                LinkState::Idle => LinkState::Scanning,
                LinkState::Scanning => self.scan().await,
                LinkState::Found(device) => {
                    self.device = Some(device);
                    LinkState::Connecting
                }
                LinkState::Connecting => self.connect().await,
                LinkState::Streaming => self.tick().await,
                LinkState::Disconnecting => self.disconnect().await,
                LinkState::Retrying => self.backoff().await,
            }
        };

        self.transition(next);
        &self.state
    }

    fn transition(&mut self, next: LinkState) {
        if next != self.state {
            debug!("Link {} -> {}", self.state, next);
        }
        self.state = next;
    }

    fn stop(&mut self) -> LinkState {
        self.stopped = true;
        LinkState::Idle
    }

    /// Wind down from wherever the shutdown request found us
    async fn step_shutdown(&mut self) -> LinkState {
        match self.state {
            LinkState::Streaming => LinkState::Disconnecting,
            LinkState::Disconnecting => self.disconnect().await,
            LinkState::Connecting => {
                self.teardown_transport().await;
                self.stop()
            }
            _ => self.stop(),
        }
    }

    async fn scan(&mut self) -> LinkState {
        let window = self.link.scan_window();
        info!("Scanning for {:?} ({:?})", self.link.device_names, window);

        let scan = tokio::select! {
            result = self.transport.scan(window) => result,
            _ = self.shutdown.requested() => return self.stop(),
        };

        match scan {
            Ok(advertisements) => {
                if let Some(ad) = advertisements
                    .into_iter()
                    .find(|ad| self.link.matches_name(&ad.device.name))
                {
                    info!("Found {} (rssi {:?})", ad.device, ad.rssi);
                    return LinkState::Found(ad.device);
                }
                info!("No matching device found");
            }
            Err(e) => warn!("Scan failed: {}", e),
        }

        self.retry_delay = self.link.scan_retry_delay();
        LinkState::Retrying
    }

    async fn connect(&mut self) -> LinkState {
        let Some(device) = self.device.clone() else {
            return LinkState::Idle;
        };
        info!("Connecting to {}", device);

        if let Err(e) = self.transport.connect(&device).await {
            warn!("Connection to {} failed: {}", device, e);
            return self.connect_failed().await;
        }

        if !self.shutdown.sleep_or_shutdown(self.link.connect_settle()).await {
            self.teardown_transport().await;
            return self.stop();
        }

        if let Err(e) = self.transport.subscribe(&self.target).await {
            warn!("Subscribing on {} failed: {}", device, e);
            return self.connect_failed().await;
        }

        self.begin_session();
        info!("Streaming from {}", device);
        LinkState::Streaming
    }

    async fn connect_failed(&mut self) -> LinkState {
        self.teardown_transport().await;
        self.retry_delay = self.link.connect_retry_delay();
        LinkState::Retrying
    }

    /// Fresh pipeline state and any pending motion settings
    fn begin_session(&mut self) {
        if let Some(updates) = self.motion_updates.as_mut() {
            if updates.has_changed().unwrap_or(false) {
                self.motion = updates.borrow_and_update().clone();
                info!("Applied reloaded motion settings");
            }
        }
        self.pipeline.reset(&self.motion);

        let mut ticker = interval(self.link.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.last_tick = None;
    }

    /// One streaming tick: wait, drain, emit
    async fn tick(&mut self) -> LinkState {
        if let Some(ticker) = self.ticker.as_mut() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.requested() => return LinkState::Disconnecting,
            }
        }

        let mut packets = Vec::new();
        let mut link_lost = false;
        loop {
            match self.transport.poll_packet() {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => break,
                Err(e) => {
                    warn!("Link lost: {}", e);
                    link_lost = true;
                    break;
                }
            }
        }

        if !packets.is_empty() {
            // Frames cover the time since the last tick that produced any
            let now = Instant::now();
            let elapsed = self
                .last_tick
                .map(|last| now.duration_since(last))
                .unwrap_or_else(|| self.link.tick_interval());

            let elapsed = elapsed.as_secs_f32();
            let outputs = self
                .pipeline
                .process_notifications(&packets, &self.motion, elapsed);
            if !outputs.is_empty() {
                self.last_tick = Some(now);
            }
            for output in &outputs {
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.record(&output.sample);
                }
                self.emit(&output.events);
            }
        }

        if link_lost {
            LinkState::Disconnecting
        } else {
            LinkState::Streaming
        }
    }

    async fn disconnect(&mut self) -> LinkState {
        if let Some(release) = self.pipeline.release_held() {
            self.emit(&[release]);
        }
        self.teardown_transport().await;
        self.ticker = None;

        let stats = self.pipeline.stats();
        info!(
            "Session ended: {} packets, {} malformed, largest gap {} ms",
            stats.packets, stats.malformed, stats.largest_gap_ms
        );
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.flush();
        }

        if self.shutdown.is_requested() {
            return self.stop();
        }
        self.retry_delay = self.link.reconnect_delay();
        LinkState::Retrying
    }

    async fn backoff(&mut self) -> LinkState {
        debug!("Retrying in {:?}", self.retry_delay);
        if self.shutdown.sleep_or_shutdown(self.retry_delay).await {
            LinkState::Idle
        } else {
            self.stop()
        }
    }

    /// Best-effort transport disconnect
    async fn teardown_transport(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
    }

    fn emit(&mut self, events: &[PointerEvent]) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = self.sink.emit(events) {
            warn!("Failed to emit pointer events: {}", e);
        }
    }
}
