//! Build-time configuration for the wind engine
//!
//! Sampling cadence, thresholds and sensor calibration are fixed when the
//! firmware is built. [`SamplingConfig::DEFAULT`] carries the values used on
//! the deployed station; hosts (the simulator, tests) build their own
//! constants and must pass them through [`SamplingConfig::validate`] before
//! the engine is started.

use thiserror_no_std::Error;

use crate::report::publish::PublishThrottle;

/// Number of report slots per hour on the deployed station (one every 5 minutes)
pub const REPORTS_PER_HOUR: usize = 12;

/// Timing, calibration and policy constants for one station
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    /// Period of the cycle-start timer
    pub cycle_period_ms: u32,
    /// Length of the pulse-counting window inside a cycle
    pub window_ms: u32,
    /// Delay between window start and the first direction sample
    pub direction_start_delay_ms: u32,
    /// Period of the direction sampler while a window is open
    pub direction_interval_ms: u32,
    /// Edges closer than this to the last accepted edge are contact bounce
    pub debounce_ms: u32,
    /// Converts pulses per second into the reported speed unit
    pub calibration_scale: f32,
    /// Vane output voltage (mV) corresponding to a full turn
    pub max_direction_voltage_mv: u16,
    /// Mounting offset added to the raw vane angle, in degrees
    pub north_offset_deg: u16,
    /// Report slots per hour, must divide 60
    pub reports_per_hour: u8,
    /// Spacing between the end-of-hour wind report and the health report
    pub health_report_delay_ms: u32,
    /// Sleep between polls of the image-transfer busy flag
    pub transfer_poll_interval_ms: u32,
    /// Decides whether a non end-of-hour wind report is published
    pub throttle: PublishThrottle,
    /// Follow each published wind report with the `<primary>/recent` record
    pub publish_recent: bool,
}

impl SamplingConfig {
    pub const DEFAULT: Self = Self {
        cycle_period_ms: 60_000,
        window_ms: 6_000,
        direction_start_delay_ms: 1_000,
        direction_interval_ms: 400,
        debounce_ms: 10,
        calibration_scale: 102.0 / 60.0,
        max_direction_voltage_mv: 1630,
        // Aim to the east so the discontinuity is not at north
        north_offset_deg: 90,
        reports_per_hour: REPORTS_PER_HOUR as u8,
        health_report_delay_ms: 500,
        transfer_poll_interval_ms: 100,
        throttle: PublishThrottle::Always,
        publish_recent: true,
    };

    /// Sampling window length in seconds, as used by the speed formula
    pub const fn window_secs(&self) -> f32 {
        self.window_ms as f32 / 1000.0
    }

    /// Check the configuration against the aggregator's compile-time slot count.
    pub fn validate(&self, slots: usize) -> Result<(), ConfigError> {
        if self.cycle_period_ms == 0
            || self.window_ms == 0
            || self.direction_interval_ms == 0
            || self.transfer_poll_interval_ms == 0
        {
            return Err(ConfigError::ZeroDuration);
        }

        if self.window_ms >= self.cycle_period_ms {
            return Err(ConfigError::WindowTooLong {
                window_ms: self.window_ms,
                cycle_period_ms: self.cycle_period_ms,
            });
        }

        if self.direction_start_delay_ms >= self.window_ms {
            return Err(ConfigError::DirectionStartTooLate {
                delay_ms: self.direction_start_delay_ms,
                window_ms: self.window_ms,
            });
        }

        if self.reports_per_hour == 0 || 60 % self.reports_per_hour != 0 {
            return Err(ConfigError::ReportsPerHour(self.reports_per_hour));
        }

        if self.reports_per_hour as usize != slots {
            return Err(ConfigError::SlotMismatch {
                configured: self.reports_per_hour,
                slots,
            });
        }

        if self.max_direction_voltage_mv == 0 {
            return Err(ConfigError::DirectionVoltage);
        }

        if self.north_offset_deg >= 360 {
            return Err(ConfigError::NorthOffset(self.north_offset_deg));
        }

        if self.calibration_scale.is_nan() || self.calibration_scale <= 0.0 {
            return Err(ConfigError::Calibration);
        }

        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Station identity plus its sampling configuration
#[derive(Debug, Clone, Copy)]
pub struct StationConfig<'a> {
    /// Prefix for every published topic, e.g. `station/annie`
    pub primary_topic: &'a str,
    pub sampling: SamplingConfig,
}

impl<'a> StationConfig<'a> {
    pub const fn new(primary_topic: &'a str, sampling: SamplingConfig) -> Self {
        Self {
            primary_topic,
            sampling,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("timer periods must be non-zero")]
    ZeroDuration,
    #[error("sampling window ({window_ms} ms) must be shorter than the cycle period ({cycle_period_ms} ms)")]
    WindowTooLong { window_ms: u32, cycle_period_ms: u32 },
    #[error("first direction sample ({delay_ms} ms) must fall inside the {window_ms} ms window")]
    DirectionStartTooLate { delay_ms: u32, window_ms: u32 },
    #[error("reports per hour ({0}) must be a non-zero divisor of 60")]
    ReportsPerHour(u8),
    #[error("{configured} reports per hour configured but the aggregator has {slots} slots")]
    SlotMismatch { configured: u8, slots: usize },
    #[error("max direction voltage must be non-zero")]
    DirectionVoltage,
    #[error("north offset {0} is not an angle below 360")]
    NorthOffset(u16),
    #[error("calibration scale must be positive")]
    Calibration,
}
