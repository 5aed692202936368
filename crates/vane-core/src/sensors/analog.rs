use log::{debug, warn};

use super::{Adc, AdcChannel, PowerMonitor, SensorError, WindVane};

/// Battery divider, top resistor (kΩ)
const BATTERY_R1_KOHM: u32 = 4_700;
/// Battery divider, bottom resistor (kΩ)
const BATTERY_R2_KOHM: u32 = 10_000;

// Two-point thermistor fit
const THERMISTOR_LOW_C: i32 = 0;
const THERMISTOR_HIGH_C: i32 = 50;
const THERMISTOR_LOW_C_MV: i32 = 2100;
const THERMISTOR_HIGH_C_MV: i32 = 1558;

/// Undo the battery sense divider: pin millivolts to battery millivolts.
pub fn battery_millivolts(pin_mv: u16) -> u16 {
    let battery_mv = pin_mv as u32 * (BATTERY_R1_KOHM + BATTERY_R2_KOHM) / BATTERY_R2_KOHM;
    battery_mv.min(u16::MAX as u32) as u16
}

/// Thermistor pin millivolts to whole degrees Celsius.
pub fn thermistor_celsius(pin_mv: u16) -> i32 {
    THERMISTOR_LOW_C
        + (pin_mv as i32 - THERMISTOR_LOW_C_MV) * (THERMISTOR_HIGH_C - THERMISTOR_LOW_C)
            / (THERMISTOR_HIGH_C_MV - THERMISTOR_LOW_C_MV)
}

pub fn celsius_to_fahrenheit(celsius: i32) -> i32 {
    (celsius as f32 * 9.0 / 5.0 + 32.0) as i32
}

/// Engineering-unit view over the node's raw ADC
pub struct AnalogSensors<A> {
    adc: A,
    last_temperature_f: i32,
}

impl<A: Adc> AnalogSensors<A> {
    pub const fn new(adc: A) -> Self {
        Self {
            adc,
            last_temperature_f: 0,
        }
    }

    /// Configure the ADC channels. The wind engine must not start if this fails.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.adc.init().await.map_err(|e| {
            warn!("ADC setup failed: {}", e);
            SensorError::InitializationFailed {
                sensor: "ADC",
                details: "channel setup rejected",
            }
        })
    }
}

impl<A: Adc> WindVane for AnalogSensors<A> {
    async fn read_direction_voltage(&mut self) -> Result<u16, SensorError> {
        self.adc.read_millivolts(AdcChannel::WindDirection).await
    }
}

impl<A: Adc> PowerMonitor for AnalogSensors<A> {
    async fn read_battery_voltage(&mut self) -> Result<u16, SensorError> {
        let pin_mv = self.adc.read_millivolts(AdcChannel::BatteryVoltage).await?;
        let battery_mv = battery_millivolts(pin_mv);
        debug!("battery {} {}", pin_mv, battery_mv);
        Ok(battery_mv)
    }

    async fn read_temperature(&mut self) -> i32 {
        match self.adc.read_millivolts(AdcChannel::Temperature).await {
            Ok(pin_mv) => {
                self.last_temperature_f = celsius_to_fahrenheit(thermistor_celsius(pin_mv));
            }
            Err(e) => {
                warn!(
                    "Temperature read failed, reusing {}F: {}",
                    self.last_temperature_f, e
                );
            }
        }
        self.last_temperature_f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    struct FixedAdc {
        temperature: Result<u16, SensorError>,
    }

    impl Adc for FixedAdc {
        async fn init(&mut self) -> Result<(), SensorError> {
            Err(SensorError::NotReady("adc"))
        }

        async fn read_millivolts(&mut self, channel: AdcChannel) -> Result<u16, SensorError> {
            match channel {
                AdcChannel::BatteryVoltage => Ok(2_500),
                AdcChannel::WindDirection => Ok(400),
                AdcChannel::Temperature => self.temperature,
            }
        }
    }

    #[test]
    fn test_battery_divider() {
        assert_eq!(battery_millivolts(0), 0);
        assert_eq!(battery_millivolts(2_500), 3_675);
    }

    #[test]
    fn test_thermistor_fit_endpoints() {
        assert_eq!(thermistor_celsius(2100), 0);
        assert_eq!(thermistor_celsius(1558), 50);
        assert_eq!(thermistor_celsius(1829), 25);
        assert_eq!(celsius_to_fahrenheit(25), 77);
        assert_eq!(celsius_to_fahrenheit(-1), 30);
    }

    #[test]
    fn test_temperature_failure_reuses_last_value() {
        let mut sensors = AnalogSensors::new(FixedAdc {
            temperature: Ok(1829),
        });
        assert_eq!(block_on(sensors.read_temperature()), 77);

        sensors.adc.temperature = Err(SensorError::ReadFailed {
            sensor: "thermistor",
            operation: "convert",
            details: "timeout",
        });
        assert_eq!(block_on(sensors.read_temperature()), 77);
    }

    #[test]
    fn test_vane_and_battery_channels() {
        let mut sensors = AnalogSensors::new(FixedAdc {
            temperature: Ok(2100),
        });
        assert_eq!(block_on(sensors.read_direction_voltage()), Ok(400));
        assert_eq!(block_on(sensors.read_battery_voltage()), Ok(3_675));
    }

    #[test]
    fn test_init_failure_is_reported() {
        let mut sensors = AnalogSensors::new(FixedAdc {
            temperature: Ok(2100),
        });
        assert!(matches!(
            block_on(sensors.init()),
            Err(SensorError::InitializationFailed { .. })
        ));
    }
}
