//! Task glue for the wind engine
//!
//! Two long-running tasks drive everything:
//!
//! - the **sampling task** ([`run_sampling`]) owns the cycle-start ticker,
//!   opens a window, runs the direction sampler until the window timer
//!   expires and then signals the publish worker;
//! - the **publish task** ([`run_publisher`]) waits for that signal and runs
//!   the [`PublishPolicy`] on the finished cycle.
//!
//! The edge interrupt, the image subsystem and the power manager only touch
//! [`WindShared`], which is built in a `static` so every context can reach
//! it without locking anything on the interrupt path.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::clock::WallClock;
use crate::config::{ConfigError, SamplingConfig};
use crate::indicator::{IndicatorColor, StatusIndicator};
use crate::report::publish::{CycleOutcome, PublishError, PublishPolicy};
use crate::sensors::{Adc, AnalogSensors, PowerMonitor, SensorError, WindVane};
use crate::transport::{TransferGate, TransferMonitor, Transport};
use crate::wind::{CycleState, DirectionSampler, PulseCounter, SamplingController};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid wind configuration: {0}")]
    Config(ConfigError),
    #[error("wind sensors unavailable: {0}")]
    Sensor(SensorError),
}

/// State reachable from every context: interrupt, tasks, image subsystem.
pub struct WindShared {
    pulses: PulseCounter,
    transfer: TransferGate,
    low_power: AtomicBool,
    controller: Mutex<CriticalSectionRawMutex, RefCell<SamplingController>>,
    /// Single-slot hand-off from the sampling task to the publish task
    work: Signal<CriticalSectionRawMutex, ()>,
}

impl WindShared {
    pub const fn new(config: &SamplingConfig) -> Self {
        Self {
            pulses: PulseCounter::new(config.debounce_ms),
            transfer: TransferGate::new(),
            low_power: AtomicBool::new(false),
            controller: Mutex::new(RefCell::new(SamplingController::new(config))),
            work: Signal::new(),
        }
    }

    /// Speed sensor edge; call from the GPIO interrupt.
    #[inline]
    pub fn on_edge(&self) -> bool {
        self.pulses.on_edge()
    }

    pub fn pulses(&self) -> &PulseCounter {
        &self.pulses
    }

    /// Busy flag the image subsystem raises around each transfer
    pub fn transfer_gate(&self) -> &TransferGate {
        &self.transfer
    }

    /// While set, cycle-start ticks are skipped.
    pub fn set_low_power(&self, low_power: bool) {
        self.low_power.store(low_power, Ordering::Release);
    }

    pub fn is_low_power(&self) -> bool {
        self.low_power.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CycleState {
        self.with_controller(|c| c.state())
    }

    /// Speed of the most recent window
    pub fn current_speed(&self) -> u16 {
        self.with_controller(|c| c.current_speed())
    }

    fn with_controller<R>(&self, f: impl FnOnce(&mut SamplingController) -> R) -> R {
        self.controller.lock(|controller| f(&mut controller.borrow_mut()))
    }

    fn start_cycle(&self) -> bool {
        let low_power = self.is_low_power();
        self.with_controller(|c| c.on_cycle_timer(low_power, &self.pulses))
    }

    /// Close the window and queue the publish job.
    fn close_window(&self, direction: u16) -> Option<u16> {
        let speed = self.with_controller(|c| c.on_window_elapsed(&self.pulses, direction))?;
        self.work.signal(());
        Some(speed)
    }
}

/// Check the configuration and bring up the ADC.
///
/// The tasks must not be spawned unless this succeeds.
pub async fn init<const SLOTS: usize, A: Adc>(
    config: &SamplingConfig,
    sensors: &mut AnalogSensors<A>,
) -> Result<(), EngineError> {
    config.validate(SLOTS).map_err(|e| {
        error!("Invalid wind configuration: {}", e);
        EngineError::Config(e)
    })?;

    sensors.init().await.map_err(|e| {
        error!("Wind sensors failed to start: {}", e);
        EngineError::Sensor(e)
    })?;

    info!(
        "Wind engine ready: {} ms cycle, {} ms window, {} reports/hour",
        config.cycle_period_ms, config.window_ms, config.reports_per_hour
    );
    Ok(())
}

/// Sampling task body. Never returns.
pub async fn run_sampling<V, I>(
    shared: &WindShared,
    config: &SamplingConfig,
    vane: &mut V,
    indicator: &mut I,
) where
    V: WindVane,
    I: StatusIndicator,
{
    let mut sampler = DirectionSampler::new(config);
    let mut ticker = Ticker::every(Duration::from_millis(config.cycle_period_ms as u64));

    loop {
        ticker.next().await;
        sample_window(shared, config, &mut sampler, vane, indicator).await;
    }
}

/// Run one sampling window if the controller allows it.
///
/// Returns the window's speed, or `None` when the cycle was skipped.
pub async fn sample_window<V, I>(
    shared: &WindShared,
    config: &SamplingConfig,
    sampler: &mut DirectionSampler,
    vane: &mut V,
    indicator: &mut I,
) -> Option<u16>
where
    V: WindVane,
    I: StatusIndicator,
{
    if !shared.start_cycle() {
        return None;
    }

    indicator.set_indicator(IndicatorColor::Green);
    let window = Timer::after(Duration::from_millis(config.window_ms as u64));
    if let Either::Second(()) = select(window, sample_directions(config, sampler, vane)).await {
        warn!("Direction sampler stopped before the window closed");
    }
    indicator.set_indicator(IndicatorColor::Off);

    shared.close_window(sampler.filtered())
}

async fn sample_directions<V: WindVane>(
    config: &SamplingConfig,
    sampler: &mut DirectionSampler,
    vane: &mut V,
) {
    Timer::after(Duration::from_millis(config.direction_start_delay_ms as u64)).await;
    let mut ticker = Ticker::every(Duration::from_millis(config.direction_interval_ms as u64));
    loop {
        sampler.sample(vane).await;
        ticker.next().await;
    }
}

/// Publish task body. Never returns.
pub async fn run_publisher<T, M, D, P, C, const SLOTS: usize>(
    shared: &WindShared,
    policy: &mut PublishPolicy<'_, T, M, D, P, SLOTS>,
    clock: &C,
) where
    T: Transport,
    M: TransferMonitor,
    D: DelayNs,
    P: PowerMonitor,
    C: WallClock,
{
    loop {
        shared.work.wait().await;
        publish_pending(shared, policy, clock).await;
    }
}

/// Run the publish policy on the window awaiting publication, if any, and
/// return the controller to idle.
pub async fn publish_pending<T, M, D, P, C, const SLOTS: usize>(
    shared: &WindShared,
    policy: &mut PublishPolicy<'_, T, M, D, P, SLOTS>,
    clock: &C,
) -> Option<Result<CycleOutcome, PublishError>>
where
    T: Transport,
    M: TransferMonitor,
    D: DelayNs,
    P: PowerMonitor,
    C: WallClock,
{
    let Some(mut job) = shared.with_controller(|c| c.begin_aggregation()) else {
        debug!("Publish signalled with no window waiting");
        return None;
    };

    let result = policy
        .publish_cycle(&mut job.accumulator, job.direction, clock.now())
        .await;
    match &result {
        Ok(outcome) => debug!("Cycle done: {:?}", outcome),
        Err(e) => warn!("Wind report dropped: {}", e),
    }

    shared.with_controller(|c| c.complete_aggregation(job.accumulator));
    Some(result)
}
