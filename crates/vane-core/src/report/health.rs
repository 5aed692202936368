//! Battery and temperature history
//!
//! Sent once an hour right after the wind report. Each report carries the
//! last `N` readings, newest first, so a missed hour can be filled in from
//! the next one.

use core::fmt::Write;

use heapless::String;
use log::{info, warn};
use thiserror_no_std::Error;

use super::{PAYLOAD_CAPACITY, ReportError, health_topic};
use crate::sensors::PowerMonitor;
use crate::transport::{Transport, TransportError};

/// Readings kept by the deployed station (twelve hours)
pub const HEALTH_HISTORY_LEN: usize = 12;

/// One health reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerReading {
    pub battery_mv: u16,
    pub temperature_f: i32,
}

/// Ring of recent health readings plus the monitor they are read from
pub struct HealthReporter<P, const N: usize = HEALTH_HISTORY_LEN> {
    power: P,
    history: [PowerReading; N],
    /// Slot the next reading goes into; moves backwards so that reading
    /// forward from it is newest-first
    newest: usize,
}

impl<P: PowerMonitor, const N: usize> HealthReporter<P, N> {
    pub const fn new(power: P) -> Self {
        Self {
            power,
            history: [PowerReading {
                battery_mv: 0,
                temperature_f: 0,
            }; N],
            newest: N - 1,
        }
    }

    /// Read battery and temperature into the newest history slot.
    ///
    /// A failed battery read is logged and stored as `0` mV.
    pub async fn sample(&mut self) -> PowerReading {
        let reading = PowerReading {
            battery_mv: self.battery_mv().await,
            temperature_f: self.power.read_temperature().await,
        };
        self.history[self.newest] = reading;
        reading
    }

    /// Battery voltage now, without touching the history.
    ///
    /// A failed read is logged and reported as `0` mV.
    pub async fn battery_mv(&mut self) -> u16 {
        match self.power.read_battery_voltage().await {
            Ok(mv) => mv,
            Err(e) => {
                warn!("Battery read failed: {}", e);
                0
            }
        }
    }

    /// Readings newest first
    pub fn readings(&self) -> impl Iterator<Item = &PowerReading> {
        (0..N).map(move |i| &self.history[(self.newest + i) % N])
    }

    /// `{"pwr":[[mv,temp],...]}`, newest first
    pub fn format_report<const C: usize>(&self) -> Result<String<C>, ReportError> {
        let mut out = String::new();
        self.write_report(&mut out)
            .map_err(|_| ReportError::Overflow { capacity: C })?;
        Ok(out)
    }

    fn write_report<W: Write>(&self, out: &mut W) -> core::fmt::Result {
        out.write_str("{\"pwr\":[")?;
        for (i, reading) in self.readings().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            write!(out, "[{},{}]", reading.battery_mv, reading.temperature_f)?;
        }
        out.write_str("]}")
    }

    /// Sample, publish the retained report to `<primary>/health` and
    /// advance the ring.
    pub async fn publish<T: Transport>(
        &mut self,
        transport: &mut T,
        primary_topic: &str,
    ) -> Result<(), HealthError> {
        let reading = self.sample().await;
        let report: String<PAYLOAD_CAPACITY> = self.format_report()?;
        self.newest = (self.newest + N - 1) % N;

        let topic = health_topic(primary_topic)?;
        info!(
            "Health report: {} mV, {}F",
            reading.battery_mv, reading.temperature_f
        );
        transport.publish(&topic, report.as_bytes(), true).await?;
        Ok(())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthError {
    #[error("health report: {0}")]
    Report(ReportError),
    #[error("health publish failed: {0}")]
    Transport(TransportError),
}

impl From<ReportError> for HealthError {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

impl From<TransportError> for HealthError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
