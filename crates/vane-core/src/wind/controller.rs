//! Sampling cycle state machine
//!
//! One cycle is `Idle → Sampling → Aggregating → Idle`:
//!
//! - the cycle-start timer moves `Idle` to `Sampling` (unless the station is
//!   in low-power mode) and clears the pulse counter;
//! - when the window timer expires the pulse total is turned into a speed,
//!   folded into the [`CycleAccumulator`] and the cycle moves to
//!   `Aggregating`;
//! - the publish worker takes a snapshot of the accumulator, publishes, and
//!   hands the (reset) accumulator back, which returns the cycle to `Idle`.
//!
//! Timers themselves live in [`crate::engine`]; this type only holds state
//! and enforces the legal transitions.

use log::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::wind::PulseCounter;

/// Phase of the current sampling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for the cycle-start timer
    Idle,
    /// Pulse counter and direction sampler are running
    Sampling,
    /// Window closed, the publish worker owns the results
    Aggregating,
}

/// Lull value of an accumulator that has not seen a sample yet
pub const LULL_CEILING: u16 = u16::MAX;

/// Speed statistics gathered since the last publish decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleAccumulator {
    pub sample_count: u16,
    pub speed_sum: u32,
    pub gust_max: u16,
    pub lull_min: u16,
}

impl CycleAccumulator {
    pub const fn new() -> Self {
        Self {
            sample_count: 0,
            speed_sum: 0,
            gust_max: 0,
            lull_min: LULL_CEILING,
        }
    }

    /// Fold one window's speed into the statistics.
    pub fn add(&mut self, speed: u16) {
        self.sample_count = self.sample_count.saturating_add(1);
        self.speed_sum = self.speed_sum.saturating_add(speed as u32);
        self.gust_max = self.gust_max.max(speed);
        self.lull_min = self.lull_min.min(speed);
    }

    /// Average speed, or `None` when no window has been recorded.
    pub fn average(&self) -> Option<u16> {
        if self.sample_count == 0 {
            return None;
        }
        Some((self.speed_sum / self.sample_count as u32) as u16)
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for CycleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// What the publish worker needs from a finished window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationJob {
    pub accumulator: CycleAccumulator,
    /// Filtered vane direction at window end, in degrees
    pub direction: u16,
}

/// Owner of the cycle state, the accumulator and the latest speed
pub struct SamplingController {
    state: CycleState,
    accumulator: CycleAccumulator,
    current_speed: u16,
    direction: u16,
    window_secs: f32,
    calibration_scale: f32,
}

impl SamplingController {
    pub const fn new(config: &SamplingConfig) -> Self {
        Self {
            state: CycleState::Idle,
            accumulator: CycleAccumulator::new(),
            current_speed: 0,
            direction: 0,
            window_secs: config.window_secs(),
            calibration_scale: config.calibration_scale,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Speed computed at the end of the last window
    pub fn current_speed(&self) -> u16 {
        self.current_speed
    }

    pub fn accumulator(&self) -> &CycleAccumulator {
        &self.accumulator
    }

    /// Convert a window's pulse total into the reported speed unit.
    pub fn speed_from_pulses(&self, pulses: u32) -> u16 {
        let speed = pulses as f32 / self.window_secs * self.calibration_scale;
        // `as` saturates, so a runaway count cannot wrap
        speed as u16
    }

    /// Cycle-start timer fired.
    ///
    /// Returns `true` when a new sampling window should be opened. The cycle
    /// is skipped in low-power mode and while the previous cycle is still in
    /// flight.
    pub fn on_cycle_timer(&mut self, low_power: bool, pulses: &PulseCounter) -> bool {
        if low_power {
            debug!("Low-power mode, skipping wind cycle");
            return false;
        }

        if self.state != CycleState::Idle {
            warn!("Wind cycle still {:?}, skipping this start", self.state);
            return false;
        }

        pulses.reset();
        self.state = CycleState::Sampling;
        true
    }

    /// Window timer expired: read the pulse total and close the window.
    ///
    /// Returns the speed measured over the window.
    pub fn on_window_elapsed(&mut self, pulses: &PulseCounter, direction: u16) -> Option<u16> {
        if self.state != CycleState::Sampling {
            warn!("Window timer fired while {:?}, ignoring", self.state);
            return None;
        }

        let count = pulses.take();
        let speed = self.speed_from_pulses(count);
        info!("Windspeed {} ({} pulses)", speed, count);

        self.current_speed = speed;
        self.direction = direction;
        self.accumulator.add(speed);
        self.state = CycleState::Aggregating;
        Some(speed)
    }

    /// Hand the window results to the publish worker.
    ///
    /// Returns `None` unless a window has closed and is awaiting publication.
    pub fn begin_aggregation(&self) -> Option<AggregationJob> {
        if self.state != CycleState::Aggregating {
            return None;
        }
        Some(AggregationJob {
            accumulator: self.accumulator,
            direction: self.direction,
        })
    }

    /// Publish worker finished; take back its accumulator and return to idle.
    pub fn complete_aggregation(&mut self, accumulator: CycleAccumulator) {
        if self.state != CycleState::Aggregating {
            warn!("Aggregation completed while {:?}", self.state);
        }
        self.accumulator = accumulator;
        self.state = CycleState::Idle;
    }
}
