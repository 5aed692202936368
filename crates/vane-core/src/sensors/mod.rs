//! Analog sensor boundary
//!
//! The node has one ADC with three channels: battery voltage, wind vane and
//! a thermistor. Raw channel access is provided by the board through [`Adc`];
//! the wind engine and the health report only see the narrower [`WindVane`]
//! and [`PowerMonitor`] traits, both implemented by [`AnalogSensors`].

mod analog;
mod shared_adc;

pub use analog::*;
pub use shared_adc::SharedAdc;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{0} device not ready")]
    NotReady(&'static str),
}

/// ADC channels wired on the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcChannel {
    BatteryVoltage,
    WindDirection,
    Temperature,
}

impl AdcChannel {
    pub const fn name(self) -> &'static str {
        match self {
            Self::BatteryVoltage => "battery",
            Self::WindDirection => "wind vane",
            Self::Temperature => "thermistor",
        }
    }
}

/// Raw multi-channel ADC provided by the board support code.
pub trait Adc {
    /// Configure every channel. Called once before the engine starts.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Read one channel, in millivolts at the pin.
    fn read_millivolts(
        &mut self,
        channel: AdcChannel,
    ) -> impl Future<Output = Result<u16, SensorError>>;
}

/// Analog read of the wind vane channel.
pub trait WindVane {
    fn read_direction_voltage(&mut self) -> impl Future<Output = Result<u16, SensorError>>;
}

/// Battery and enclosure temperature readings for the health report.
pub trait PowerMonitor {
    /// Battery voltage in millivolts (after the divider correction)
    fn read_battery_voltage(&mut self) -> impl Future<Output = Result<u16, SensorError>>;

    /// Enclosure temperature in °F
    fn read_temperature(&mut self) -> impl Future<Output = i32>;
}
