//! Per-slot wind summaries for the current hour
//!
//! The hour is split into `SLOTS` equal report slots; a slot holds the
//! average, gust and lull speed plus the filtered direction of the cycle
//! that last landed in it. The first cycle of a new hour wipes every slot so
//! a report never mixes two hours.
//!
//! A slot reading `0` speed and `0°` is what a wiped slot looks like, so a
//! real calm northerly reading is stored as `1°` instead.

use core::fmt::Write;

use heapless::String;
use log::debug;

use super::ReportError;
use crate::clock::WallTime;

/// Summary of one report slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportSlot {
    pub avg_speed: u16,
    pub gust: u16,
    pub lull: u16,
    /// Degrees, `0..360`
    pub direction: u16,
}

impl ReportSlot {
    pub const EMPTY: Self = Self {
        avg_speed: 0,
        gust: 0,
        lull: 0,
        direction: 0,
    };
}

/// Fixed-size set of report slots covering one hour
pub struct ReportAggregator<const SLOTS: usize> {
    slots: [ReportSlot; SLOTS],
}

impl<const SLOTS: usize> ReportAggregator<SLOTS> {
    /// Minutes covered by one slot
    pub const MINUTES_PER_SLOT: u8 = (60 / SLOTS) as u8;

    pub const fn new() -> Self {
        Self {
            slots: [ReportSlot::EMPTY; SLOTS],
        }
    }

    /// Slot that `minute_of_hour` falls into.
    pub fn slot_index(minute_of_hour: u8) -> usize {
        (minute_of_hour / Self::MINUTES_PER_SLOT) as usize % SLOTS
    }

    /// Whether `minute_of_hour` falls into the hour's final slot
    pub fn is_last_slot(minute_of_hour: u8) -> bool {
        Self::slot_index(minute_of_hour) == SLOTS - 1
    }

    pub fn slots(&self) -> &[ReportSlot; SLOTS] {
        &self.slots
    }

    /// Store one cycle's summary in the slot for `minute_of_hour`.
    ///
    /// Returns the slot index written.
    pub fn record_slot(
        &mut self,
        minute_of_hour: u8,
        avg_speed: u16,
        gust: u16,
        lull: u16,
        direction: u16,
    ) -> usize {
        let index = self.start_slot(minute_of_hour);
        self.slots[index] = ReportSlot {
            avg_speed,
            gust,
            lull,
            direction: disambiguate(avg_speed, direction),
        };
        debug!("slot {} <- {:?}", index, self.slots[index]);
        index
    }

    /// Update only the direction of the slot for `minute_of_hour`.
    ///
    /// Used when a cycle produced no speed samples; the slot's speed
    /// figures are kept but the hourly wipe still applies.
    pub fn record_direction(&mut self, minute_of_hour: u8, direction: u16) -> usize {
        let index = self.start_slot(minute_of_hour);
        let slot = &mut self.slots[index];
        slot.direction = disambiguate(slot.avg_speed, direction);
        index
    }

    fn start_slot(&mut self, minute_of_hour: u8) -> usize {
        if minute_of_hour < Self::MINUTES_PER_SLOT {
            self.slots = [ReportSlot::EMPTY; SLOTS];
        }
        Self::slot_index(minute_of_hour)
    }

    /// Serialize every slot, in slot order, with the report timestamp:
    ///
    /// `{"time":"2024-03-01T14:30Z","wind":[[avg,dir,gust,lull],...]}`
    pub fn format_report<const N: usize>(&self, time: &WallTime) -> Result<String<N>, ReportError> {
        let mut out = String::new();
        write_report(&mut out, time, &self.slots).map_err(|_| ReportError::Overflow { capacity: N })?;
        Ok(out)
    }
}

impl<const SLOTS: usize> Default for ReportAggregator<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

fn disambiguate(avg_speed: u16, direction: u16) -> u16 {
    if avg_speed == 0 && direction == 0 {
        1
    } else {
        direction
    }
}

fn write_report<W: Write>(out: &mut W, time: &WallTime, slots: &[ReportSlot]) -> core::fmt::Result {
    write!(out, "{{\"time\":\"{}\",\"wind\":[", time)?;
    for (i, slot) in slots.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        write!(
            out,
            "[{},{},{},{}]",
            slot.avg_speed, slot.direction, slot.gust, slot.lull
        )?;
    }
    out.write_str("]}")
}
