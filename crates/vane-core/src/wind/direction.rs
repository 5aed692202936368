//! Wind vane sampling and circular averaging
//!
//! While a sampling window is open the vane voltage is read on a fixed
//! period, turned into an angle and written into an 8-slot ring. The
//! filtered direction is a three-level tree of pairwise circular means over
//! that ring, so readings either side of the 0°/360° seam average to the seam
//! instead of to the opposite side of the compass.

use log::{debug, warn};

use crate::config::SamplingConfig;
use crate::sensors::WindVane;

/// Number of raw angles kept by the direction filter
pub const DIRECTION_RING_LEN: usize = 8;

/// Mean of two angles in `[0, 360)` taken along the shorter arc.
///
/// Odd differences round toward `b`, so swapping the arguments can move the
/// result by one degree. Exactly opposite angles have two equally short arcs;
/// the result then depends on argument order.
pub fn circ_avg(a: u16, b: u16) -> u16 {
    let (a, b) = (a as i32, b as i32);
    let diff = ((a - b + 180 + 360) % 360) - 180;
    ((360 + b + diff / 2) % 360) as u16
}

/// Convert a vane voltage into a compass angle.
pub fn voltage_to_angle(voltage_mv: u16, max_voltage_mv: u16, north_offset_deg: u16) -> u16 {
    let raw = voltage_mv as u32 * 360 / max_voltage_mv as u32;
    ((raw + north_offset_deg as u32) % 360) as u16
}

/// Pairwise circular mean of 8 angles: 8 → 4 → 2 → 1.
pub fn hierarchical_mean(ring: &[u16; DIRECTION_RING_LEN]) -> u16 {
    let left = circ_avg(circ_avg(ring[0], ring[1]), circ_avg(ring[2], ring[3]));
    let right = circ_avg(circ_avg(ring[4], ring[5]), circ_avg(ring[6], ring[7]));
    circ_avg(left, right)
}

/// Ring of recent vane angles plus the filtered direction derived from it
pub struct DirectionSampler {
    ring: [u16; DIRECTION_RING_LEN],
    index: usize,
    filtered: u16,
    max_voltage_mv: u16,
    north_offset_deg: u16,
}

impl DirectionSampler {
    pub const fn new(config: &SamplingConfig) -> Self {
        Self {
            ring: [0; DIRECTION_RING_LEN],
            index: 0,
            filtered: 0,
            max_voltage_mv: config.max_direction_voltage_mv,
            north_offset_deg: config.north_offset_deg,
        }
    }

    /// Take one reading from the vane and fold it into the filter.
    ///
    /// A failed ADC read is logged and skipped; the ring and the filtered
    /// value are left untouched. Returns the new filtered direction.
    pub async fn sample<V: WindVane>(&mut self, vane: &mut V) -> Option<u16> {
        let voltage = match vane.read_direction_voltage().await {
            Ok(voltage) => voltage,
            Err(e) => {
                warn!("Failed to get direction voltage: {}", e);
                return None;
            }
        };

        let direction = self.record_voltage(voltage);
        debug!("dir volts {} dir {}", voltage, direction);
        Some(direction)
    }

    /// Convert a vane voltage and record the resulting angle.
    pub fn record_voltage(&mut self, voltage_mv: u16) -> u16 {
        let angle = voltage_to_angle(voltage_mv, self.max_voltage_mv, self.north_offset_deg);
        self.record_angle(angle)
    }

    /// Overwrite the oldest ring slot with `angle` and refilter.
    pub fn record_angle(&mut self, angle: u16) -> u16 {
        self.ring[self.index] = angle % 360;
        self.index = (self.index + 1) % DIRECTION_RING_LEN;
        self.filtered = hierarchical_mean(&self.ring);
        self.filtered
    }

    /// Latest filtered direction in degrees
    pub fn filtered(&self) -> u16 {
        self.filtered
    }

    /// Raw angles in ring order (not age order)
    pub fn ring(&self) -> &[u16; DIRECTION_RING_LEN] {
        &self.ring
    }
}
