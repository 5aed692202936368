//! Debounced anemometer pulse counter
//!
//! The speed sensor closes a reed contact once per cup rotation. Every edge
//! on that line reaches [`PulseCounter::on_edge`] from interrupt context, so
//! the counter is made of atomics only: the edge path never blocks and never
//! takes a lock.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_time::Instant;

/// Pulse count shared between the edge interrupt and the sampling controller.
///
/// The interrupt is the only writer of the count between resets; the
/// controller is the only party that clears it, once at window start and
/// once when it reads the window total with [`take`](Self::take).
pub struct PulseCounter {
    count: AtomicU32,
    /// Uptime (ms, wrapping) of the last accepted edge
    last_edge_ms: AtomicU32,
    /// Whether any edge has been accepted since the last reset
    seen_edge: AtomicBool,
    debounce_ms: u32,
}

impl PulseCounter {
    pub const fn new(debounce_ms: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            last_edge_ms: AtomicU32::new(0),
            seen_edge: AtomicBool::new(false),
            debounce_ms,
        }
    }

    /// Record an edge using the embassy monotonic clock.
    ///
    /// Call from the GPIO interrupt handler of the speed sensor line.
    #[inline]
    pub fn on_edge(&self) -> bool {
        self.on_edge_at(Instant::now().as_millis() as u32)
    }

    /// Record an edge observed at `now_ms` (wrapping milliseconds of uptime).
    ///
    /// Returns `true` when the edge was counted and `false` when it fell
    /// inside the debounce interval of the previous accepted edge.
    pub fn on_edge_at(&self, now_ms: u32) -> bool {
        let last = self.last_edge_ms.load(Ordering::Relaxed);
        let first = !self.seen_edge.load(Ordering::Relaxed);

        if first || now_ms.wrapping_sub(last) > self.debounce_ms {
            self.count.fetch_add(1, Ordering::Relaxed);
            self.last_edge_ms.store(now_ms, Ordering::Relaxed);
            self.seen_edge.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Current count without clearing it.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Clear the count and forget the debounce history.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
        self.seen_edge.store(false, Ordering::Release);
    }

    /// Read the window total and clear it in one step.
    pub fn take(&self) -> u32 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounce_inside_debounce_is_dropped() {
        let counter = PulseCounter::new(10);

        assert!(counter.on_edge_at(0));
        assert!(!counter.on_edge_at(5));
        assert!(counter.on_edge_at(20));

        assert_eq!(counter.take(), 2);
    }

    #[test]
    fn test_spaced_edges_are_all_counted() {
        let counter = PulseCounter::new(10);

        for i in 0..50u32 {
            counter.on_edge_at(1_000 + i * 11);
        }

        assert_eq!(counter.count(), 50);
    }

    #[test]
    fn test_edge_exactly_at_threshold_is_bounce() {
        let counter = PulseCounter::new(10);

        counter.on_edge_at(100);
        assert!(!counter.on_edge_at(110));
        assert!(counter.on_edge_at(121));
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_take_clears_count() {
        let counter = PulseCounter::new(10);
        counter.on_edge_at(0);
        counter.on_edge_at(50);

        assert_eq!(counter.take(), 2);
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.take(), 0);
    }

    #[test]
    fn test_reset_accepts_next_edge_immediately() {
        let counter = PulseCounter::new(10);
        counter.on_edge_at(1_000);
        counter.reset();

        // Within the old debounce interval, but history was forgotten
        assert!(counter.on_edge_at(1_003));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_uptime_wraparound() {
        let counter = PulseCounter::new(10);

        assert!(counter.on_edge_at(u32::MAX - 4));
        // 5 ms later across the wrap: bounce
        assert!(!counter.on_edge_at(0));
        // 16 ms later across the wrap: counted
        assert!(counter.on_edge_at(11));
        assert_eq!(counter.count(), 2);
    }
}
