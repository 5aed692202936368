//! Wall-clock boundary
//!
//! Report slots are indexed by minute of the hour and the hourly topic by the
//! hour, so the engine needs UTC wall time rather than uptime. The board
//! provides it (network time on the deployed node, an accelerated clock in
//! the simulator) through [`WallClock`].

use core::fmt::{self, Display};

/// Broken-down UTC time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WallTime {
    pub year: u16,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WallTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }
}

/// Formats as `YYYY-MM-DDTHH:MMZ`, the timestamp used in wind reports.
impl Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// Source of the current UTC time.
pub trait WallClock {
    fn now(&self) -> WallTime;
}
