//! Latest-reading record
//!
//! After each wind report the station also publishes its most recent speed,
//! direction and battery voltage to `<primary>/recent`, a small retained
//! message for dashboards that only want the current conditions:
//!
//! `{"time":" 3/ 1 14:30","sp":"4","dir":"88","mv":"4050"}`
//!
//! Values are quoted and month/day/hour are space-padded, the format existing
//! consumers of the station already parse.

use core::fmt::Write;

use heapless::String;

use super::{ReportError, TOPIC_CAPACITY};
use crate::clock::WallTime;

/// Largest latest-reading payload
pub const RECENT_CAPACITY: usize = 96;

/// One latest-reading record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentReading {
    pub speed: u16,
    pub direction: u16,
    pub battery_mv: u16,
}

/// Topic of the retained latest-reading record: `<primary>/recent`.
pub fn recent_topic(primary_topic: &str) -> Result<String<TOPIC_CAPACITY>, ReportError> {
    let mut topic = String::new();
    write!(topic, "{}/recent", primary_topic).map_err(|_| ReportError::Overflow {
        capacity: TOPIC_CAPACITY,
    })?;
    Ok(topic)
}

pub fn format_recent(
    time: &WallTime,
    reading: &RecentReading,
) -> Result<String<RECENT_CAPACITY>, ReportError> {
    let mut out = String::new();
    write!(
        out,
        "{{\"time\":\"{:2}/{:2} {:2}:{:02}\",\"sp\":\"{}\",\"dir\":\"{}\",\"mv\":\"{}\"}}",
        time.month,
        time.day,
        time.hour,
        time.minute,
        reading.speed,
        reading.direction,
        reading.battery_mv
    )
    .map_err(|_| ReportError::Overflow {
        capacity: RECENT_CAPACITY,
    })?;
    Ok(out)
}
