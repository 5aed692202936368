//! Publish decision for each finished sampling cycle
//!
//! [`PublishPolicy::publish_cycle`] runs once per cycle on the publish
//! worker, in this order:
//!
//! 1. wait while the image subsystem is using the transport;
//! 2. on the first call only, erase the retained report of every hour
//!    (`<primary>/wind/00` to `/23`) left behind by a previous run;
//! 3. fold the cycle into its report slot;
//! 4. publish the hour's report if this is the hour's last slot or the
//!    [`PublishThrottle`] allows it, followed by the `<primary>/recent`
//!    latest reading when enabled;
//! 5. in the hour's last slot, follow up with the health report after a
//!    short delay;
//! 6. reset the cycle accumulator, whatever happened above.
//!
//! Delivery is best effort. A failed publish is logged and reported to the
//! caller; the next cycle simply tries again with fresh data.

use embedded_hal_async::delay::DelayNs;
use heapless::String;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use super::aggregator::ReportAggregator;
use super::health::{HealthError, HealthReporter};
use super::recent::{RecentReading, format_recent, recent_topic};
use super::{PAYLOAD_CAPACITY, ReportError, wind_topic};
use crate::clock::WallTime;
use crate::config::StationConfig;
use crate::sensors::PowerMonitor;
use crate::transport::{TransferMonitor, Transport, TransportError};
use crate::wind::CycleAccumulator;

/// Hourly topics erased at startup
const HOURS_PER_DAY: u8 = 24;

/// Predicate for publishing a report outside the hour's last slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishThrottle {
    /// Publish after every cycle
    Always,
    /// Publish only strictly between `first_hour` and `last_hour` (UTC), and
    /// then only if the average speed is above `min_speed` or differs from
    /// the last published one
    WhenActive {
        min_speed: u16,
        first_hour: u8,
        last_hour: u8,
    },
}

/// What the throttle gets to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleContext {
    pub hour: u8,
    pub avg_speed: u16,
    pub last_published_speed: Option<u16>,
}

impl PublishThrottle {
    pub fn allows(&self, ctx: &ThrottleContext) -> bool {
        match *self {
            Self::Always => true,
            Self::WhenActive {
                min_speed,
                first_hour,
                last_hour,
            } => {
                let active = ctx.hour > first_hour && ctx.hour < last_hour;
                let changed = ctx.last_published_speed != Some(ctx.avg_speed);
                active && (ctx.avg_speed > min_speed || changed)
            }
        }
    }
}

/// Result of one publish decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The wind report went out; `health_sent` is set when the end-of-hour
    /// health report followed it
    Published { slot: usize, health_sent: bool },
    /// The throttle held the report back
    Throttled { slot: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    #[error("wind report: {0}")]
    Report(ReportError),
    #[error("wind publish failed: {0}")]
    Transport(TransportError),
}

impl From<ReportError> for PublishError {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

impl From<TransportError> for PublishError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Owns the hour's report slots and every port needed to publish them
pub struct PublishPolicy<'a, T, M, D, P, const SLOTS: usize> {
    primary_topic: &'a str,
    throttle: PublishThrottle,
    health_report_delay_ms: u32,
    transfer_poll_interval_ms: u32,
    publish_recent: bool,
    /// Set once the startup clear has run; never cleared
    history_cleared: bool,
    last_published_speed: Option<u16>,
    aggregator: ReportAggregator<SLOTS>,
    health: HealthReporter<P>,
    transport: T,
    monitor: M,
    delay: D,
}

impl<'a, T, M, D, P, const SLOTS: usize> PublishPolicy<'a, T, M, D, P, SLOTS>
where
    T: Transport,
    M: TransferMonitor,
    D: DelayNs,
    P: PowerMonitor,
{
    pub fn new(
        station: &StationConfig<'a>,
        transport: T,
        monitor: M,
        delay: D,
        health: HealthReporter<P>,
    ) -> Self {
        Self {
            primary_topic: station.primary_topic,
            throttle: station.sampling.throttle,
            health_report_delay_ms: station.sampling.health_report_delay_ms,
            transfer_poll_interval_ms: station.sampling.transfer_poll_interval_ms,
            publish_recent: station.sampling.publish_recent,
            history_cleared: false,
            last_published_speed: None,
            aggregator: ReportAggregator::new(),
            health,
            transport,
            monitor,
            delay,
        }
    }

    pub fn history_cleared(&self) -> bool {
        self.history_cleared
    }

    pub fn aggregator(&self) -> &ReportAggregator<SLOTS> {
        &self.aggregator
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the publish decision for one finished cycle.
    ///
    /// `accumulator` is reset before returning on every path, including
    /// errors.
    pub async fn publish_cycle(
        &mut self,
        accumulator: &mut CycleAccumulator,
        direction: u16,
        now: WallTime,
    ) -> Result<CycleOutcome, PublishError> {
        let outcome = self.decide_and_publish(accumulator, direction, &now).await;
        accumulator.reset();
        outcome
    }

    async fn decide_and_publish(
        &mut self,
        accumulator: &CycleAccumulator,
        direction: u16,
        now: &WallTime,
    ) -> Result<CycleOutcome, PublishError> {
        self.wait_for_transfer().await;
        self.clear_history().await;

        let (slot, avg_speed) = match accumulator.average() {
            Some(avg_speed) => {
                let slot = self.aggregator.record_slot(
                    now.minute,
                    avg_speed,
                    accumulator.gust_max,
                    accumulator.lull_min,
                    direction,
                );
                (slot, avg_speed)
            }
            None => {
                warn!("No wind samples this cycle, updating direction only");
                let slot = self.aggregator.record_direction(now.minute, direction);
                (slot, self.aggregator.slots()[slot].avg_speed)
            }
        };

        let end_of_hour = slot == SLOTS - 1;
        let ctx = ThrottleContext {
            hour: now.hour,
            avg_speed,
            last_published_speed: self.last_published_speed,
        };
        if !end_of_hour && !self.throttle.allows(&ctx) {
            debug!("Wind report for slot {} held back by {:?}", slot, self.throttle);
            return Ok(CycleOutcome::Throttled { slot });
        }

        let topic = wind_topic(self.primary_topic, now.hour)?;
        let report: String<PAYLOAD_CAPACITY> = self.aggregator.format_report(now)?;
        debug!("{} {}", topic, report);
        if let Err(e) = self.transport.publish(&topic, report.as_bytes(), true).await {
            warn!("Failed to send wind message: {}", e);
            return Err(e.into());
        }
        self.last_published_speed = Some(avg_speed);

        if self.publish_recent {
            self.send_recent(avg_speed, direction, now).await;
        }

        let mut health_sent = false;
        if end_of_hour {
            info!("Last slot of hour {:02}, sending health report", now.hour);
            self.delay.delay_ms(self.health_report_delay_ms).await;
            match self.health.publish(&mut self.transport, self.primary_topic).await {
                Ok(()) => health_sent = true,
                Err(HealthError::Transport(e)) => warn!("Failed to send health message: {}", e),
                Err(e) => warn!("{}", e),
            }
        }

        Ok(CycleOutcome::Published { slot, health_sent })
    }

    /// Publish the retained latest-reading record. Failures are logged only.
    async fn send_recent(&mut self, speed: u16, direction: u16, now: &WallTime) {
        let reading = RecentReading {
            speed,
            direction,
            battery_mv: self.health.battery_mv().await,
        };
        let (topic, payload) = match (recent_topic(self.primary_topic), format_recent(now, &reading)) {
            (Ok(topic), Ok(payload)) => (topic, payload),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to build recent reading: {}", e);
                return;
            }
        };
        debug!("{} {}", topic, payload);
        if let Err(e) = self.transport.publish(&topic, payload.as_bytes(), true).await {
            warn!("Failed to send recent reading: {}", e);
        }
    }

    /// Erase the retained wind report of every hour, once per run.
    ///
    /// The latch is set before the burst starts; a failed publish ends the
    /// burst and it is not retried.
    pub async fn clear_history(&mut self) {
        if self.history_cleared {
            return;
        }
        self.history_cleared = true;

        info!("Clearing retained wind history");
        for hour in 0..HOURS_PER_DAY {
            let topic = match wind_topic(self.primary_topic, hour) {
                Ok(topic) => topic,
                Err(e) => {
                    warn!("Failed to build clear topic: {}", e);
                    return;
                }
            };
            if let Err(e) = self.transport.publish(&topic, &[], true).await {
                warn!("Failed to send broker clear message: {}", e);
                return;
            }
        }
    }

    /// Sleep until the image subsystem releases the transport.
    ///
    /// Returns how many times the busy flag was seen set.
    pub async fn wait_for_transfer(&mut self) -> u32 {
        let mut busy_polls = 0;
        while self.monitor.is_transfer_busy() {
            if busy_polls == 0 {
                debug!("Image transfer in progress, holding wind report");
            }
            busy_polls += 1;
            self.delay.delay_ms(self.transfer_poll_interval_ms).await;
        }
        busy_polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingConfig;
    use crate::sensors::SensorError;
    use core::cell::{Cell, RefCell};
    use embassy_futures::block_on;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Poll(bool),
        Sleep(u32),
        Publish {
            topic: String<32>,
            payload: String<PAYLOAD_CAPACITY>,
            retain: bool,
        },
    }

    type Log = RefCell<heapless::Vec<Event, 64>>;

    fn push(log: &Log, event: Event) {
        log.borrow_mut().push(event).unwrap();
    }

    struct MockTransport<'l> {
        log: &'l Log,
        fail: Cell<bool>,
    }

    impl Transport for MockTransport<'_> {
        async fn publish(
            &mut self,
            topic: &str,
            payload: &[u8],
            retain: bool,
        ) -> Result<(), TransportError> {
            if self.fail.get() {
                return Err(TransportError::NotConnected);
            }
            let mut event_topic = String::new();
            event_topic.push_str(topic).unwrap();
            let mut event_payload = String::new();
            event_payload
                .push_str(core::str::from_utf8(payload).unwrap())
                .unwrap();
            push(
                self.log,
                Event::Publish {
                    topic: event_topic,
                    payload: event_payload,
                    retain,
                },
            );
            Ok(())
        }
    }

    /// Busy for the first `busy_polls` checks
    struct ScriptedTransfer<'l> {
        log: &'l Log,
        busy_polls: Cell<u32>,
    }

    impl TransferMonitor for ScriptedTransfer<'_> {
        fn is_transfer_busy(&self) -> bool {
            let busy = self.busy_polls.get() > 0;
            if busy {
                self.busy_polls.set(self.busy_polls.get() - 1);
            }
            push(self.log, Event::Poll(busy));
            busy
        }
    }

    struct RecordingDelay<'l> {
        log: &'l Log,
    }

    impl DelayNs for RecordingDelay<'_> {
        async fn delay_ns(&mut self, _ns: u32) {}

        async fn delay_ms(&mut self, ms: u32) {
            push(self.log, Event::Sleep(ms));
        }
    }

    struct SteadyBattery;

    impl PowerMonitor for SteadyBattery {
        async fn read_battery_voltage(&mut self) -> Result<u16, SensorError> {
            Ok(4_050)
        }

        async fn read_temperature(&mut self) -> i32 {
            68
        }
    }

    type TestPolicy<'l> = PublishPolicy<
        'static,
        MockTransport<'l>,
        ScriptedTransfer<'l>,
        RecordingDelay<'l>,
        SteadyBattery,
        12,
    >;

    const STATION: StationConfig<'static> = StationConfig::new("annie", SamplingConfig::DEFAULT);

    fn policy_with<'l>(
        log: &'l Log,
        station: &StationConfig<'static>,
        busy_polls: u32,
    ) -> TestPolicy<'l> {
        PublishPolicy::new(
            station,
            MockTransport {
                log,
                fail: Cell::new(false),
            },
            ScriptedTransfer {
                log,
                busy_polls: Cell::new(busy_polls),
            },
            RecordingDelay { log },
            HealthReporter::new(SteadyBattery),
        )
    }

    fn policy(log: &Log) -> TestPolicy<'_> {
        policy_with(log, &STATION, 0)
    }

    fn accumulator(speeds: &[u16]) -> CycleAccumulator {
        let mut acc = CycleAccumulator::new();
        for &speed in speeds {
            acc.add(speed);
        }
        acc
    }

    fn at(hour: u8, minute: u8) -> WallTime {
        WallTime::new(2024, 3, 1, hour, minute, 0)
    }

    fn published_topics(log: &Log) -> heapless::Vec<String<32>, 64> {
        log.borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Publish { topic, .. } => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    fn is_tombstone(event: &Event) -> bool {
        matches!(event, Event::Publish { payload, retain: true, .. } if payload.is_empty())
    }

    #[test]
    fn test_startup_clear_runs_once() {
        let log = Log::default();
        let mut policy = policy(&log);

        for minute in [10, 11, 12] {
            let mut acc = accumulator(&[4]);
            block_on(policy.publish_cycle(&mut acc, 88, at(14, minute))).unwrap();
        }

        let tombstones = log.borrow().iter().filter(|e| is_tombstone(e)).count();
        assert_eq!(tombstones, 24);
        assert!(policy.history_cleared());

        // Every cycle sends its wind report and the latest reading
        let topics = published_topics(&log);
        assert_eq!(topics.len(), 24 + 3 * 2);
        assert_eq!(topics[0].as_str(), "annie/wind/00");
        assert_eq!(topics[23].as_str(), "annie/wind/23");
        // Clear burst precedes the first real report
        let log = log.borrow();
        let mut publishes = log.iter().filter(|e| matches!(e, Event::Publish { .. }));
        assert!(publishes.by_ref().take(24).all(is_tombstone));
        assert_eq!(topics[24].as_str(), "annie/wind/14");
        assert_eq!(topics[25].as_str(), "annie/recent");
    }

    #[test]
    fn test_clear_burst_waits_for_transfer() {
        let log = Log::default();
        let mut policy = policy_with(&log, &STATION, 1);

        let mut acc = accumulator(&[4]);
        block_on(policy.publish_cycle(&mut acc, 88, at(14, 10))).unwrap();

        let poll_ms = SamplingConfig::DEFAULT.transfer_poll_interval_ms;
        let log = log.borrow();
        assert_eq!(log[0], Event::Poll(true));
        assert_eq!(log[1], Event::Sleep(poll_ms));
        assert_eq!(log[2], Event::Poll(false));
        let first_tombstone = log.iter().position(is_tombstone).unwrap();
        assert_eq!(first_tombstone, 3);
        assert!(log[3..27].iter().all(is_tombstone));
    }

    #[test]
    fn test_report_payload() {
        let log = Log::default();
        let mut policy = policy(&log);

        let mut acc = accumulator(&[2, 6, 4]);
        let outcome = block_on(policy.publish_cycle(&mut acc, 88, at(14, 0))).unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Published {
                slot: 0,
                health_sent: false
            }
        );

        let log = log.borrow();
        let Some(Event::Publish {
            payload, retain, ..
        }) = log
            .iter()
            .find(|e| matches!(e, Event::Publish { topic, .. } if topic == "annie/wind/14"))
        else {
            panic!("no report published");
        };
        assert!(*retain);
        assert!(payload.starts_with(r#"{"time":"2024-03-01T14:00Z","wind":[[4,88,6,2],[0,0,0,0],"#));
        assert!(payload.ends_with("[0,0,0,0]]}"));
    }

    #[test]
    fn test_end_of_hour_sends_health_after_delay() {
        let log = Log::default();
        let mut policy = policy(&log);
        block_on(policy.clear_history());
        log.borrow_mut().clear();

        let mut acc = accumulator(&[5]);
        let outcome = block_on(policy.publish_cycle(&mut acc, 91, at(9, 57))).unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Published {
                slot: 11,
                health_sent: true
            }
        );

        let log = log.borrow();
        let events: heapless::Vec<&Event, 8> =
            log.iter().filter(|e| !matches!(e, Event::Poll(_))).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Event::Publish { topic, .. } if topic == "annie/wind/09"));
        assert!(matches!(events[1], Event::Publish { topic, .. } if topic == "annie/recent"));
        assert_eq!(events[2], &Event::Sleep(SamplingConfig::DEFAULT.health_report_delay_ms));
        let Event::Publish { topic, payload, .. } = events[3] else {
            panic!("health report missing");
        };
        assert_eq!(topic.as_str(), "annie/health");
        assert!(payload.starts_with(r#"{"pwr":[[4050,68],"#));
    }

    #[test]
    fn test_transfer_backpressure_defers_publish() {
        let log = Log::default();
        let mut policy = policy_with(&log, &STATION, 2);
        policy.history_cleared = true;

        let mut acc = accumulator(&[3, 7]);
        block_on(policy.publish_cycle(&mut acc, 45, at(6, 20))).unwrap();

        let poll_ms = SamplingConfig::DEFAULT.transfer_poll_interval_ms;
        let log = log.borrow();
        assert_eq!(log[0], Event::Poll(true));
        assert_eq!(log[1], Event::Sleep(poll_ms));
        assert_eq!(log[2], Event::Poll(true));
        assert_eq!(log[3], Event::Sleep(poll_ms));
        assert_eq!(log[4], Event::Poll(false));
        let Event::Publish { payload, .. } = &log[5] else {
            panic!("report not published after transfer");
        };
        // Both samples made it into the slot
        assert!(payload.contains("[5,45,7,3]"));
        assert!(matches!(&log[6], Event::Publish { topic, .. } if topic == "annie/recent"));
        assert_eq!(log.len(), 7);
    }

    #[test]
    fn test_publish_failure_still_resets_accumulator() {
        let log = Log::default();
        let mut policy = policy(&log);
        policy.history_cleared = true;
        policy.transport.fail.set(true);

        let mut acc = accumulator(&[8, 9]);
        let result = block_on(policy.publish_cycle(&mut acc, 180, at(12, 30)));
        assert_eq!(
            result,
            Err(PublishError::Transport(TransportError::NotConnected))
        );
        assert!(acc.is_empty());
        assert_eq!(acc, CycleAccumulator::new());
        // The slot was still recorded
        assert_eq!(policy.aggregator().slots()[6].avg_speed, 8);

        policy.transport.fail.set(false);
        let mut acc = accumulator(&[1]);
        assert!(block_on(policy.publish_cycle(&mut acc, 180, at(12, 31))).is_ok());
    }

    #[test]
    fn test_failed_clear_is_not_retried() {
        let log = Log::default();
        let mut policy = policy(&log);
        policy.transport.fail.set(true);
        block_on(policy.clear_history());
        assert!(policy.history_cleared());

        policy.transport.fail.set(false);
        let mut acc = accumulator(&[2]);
        block_on(policy.publish_cycle(&mut acc, 10, at(3, 5))).unwrap();
        let topics = published_topics(&log);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].as_str(), "annie/wind/03");
    }

    #[test]
    fn test_recent_reading_follows_report() {
        let log = Log::default();
        let mut policy = policy(&log);
        policy.history_cleared = true;

        let mut acc = accumulator(&[3, 5]);
        block_on(policy.publish_cycle(&mut acc, 88, at(14, 10))).unwrap();

        let log = log.borrow();
        let Some(Event::Publish {
            topic,
            payload,
            retain,
        }) = log.last()
        else {
            panic!("no recent reading published");
        };
        assert_eq!(topic.as_str(), "annie/recent");
        assert!(*retain);
        assert_eq!(
            payload.as_str(),
            r#"{"time":" 3/ 1 14:10","sp":"4","dir":"88","mv":"4050"}"#
        );
    }

    #[test]
    fn test_recent_reading_can_be_disabled() {
        let log = Log::default();
        let station = StationConfig::new(
            "annie",
            SamplingConfig {
                publish_recent: false,
                ..SamplingConfig::DEFAULT
            },
        );
        let mut policy = policy_with(&log, &station, 0);
        policy.history_cleared = true;

        let mut acc = accumulator(&[3]);
        block_on(policy.publish_cycle(&mut acc, 88, at(14, 10))).unwrap();

        let topics = published_topics(&log);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].as_str(), "annie/wind/14");
    }

    #[test]
    fn test_throttled_cycle_sends_no_recent_reading() {
        let log = Log::default();
        let station = StationConfig::new(
            "annie",
            SamplingConfig {
                throttle: PublishThrottle::WhenActive {
                    min_speed: 2,
                    first_hour: 9,
                    last_hour: 21,
                },
                ..SamplingConfig::DEFAULT
            },
        );
        let mut policy = policy_with(&log, &station, 0);
        policy.history_cleared = true;

        let mut acc = accumulator(&[5]);
        block_on(policy.publish_cycle(&mut acc, 0, at(3, 30))).unwrap();
        assert!(published_topics(&log).is_empty());
    }

    #[test]
    fn test_empty_cycle_updates_direction_only() {
        let log = Log::default();
        let mut policy = policy(&log);

        let mut acc = accumulator(&[6]);
        block_on(policy.publish_cycle(&mut acc, 100, at(8, 40))).unwrap();
        let mut empty = CycleAccumulator::new();
        block_on(policy.publish_cycle(&mut empty, 140, at(8, 42))).unwrap();

        let slot = policy.aggregator().slots()[8];
        assert_eq!(slot.avg_speed, 6);
        assert_eq!(slot.direction, 140);
    }

    #[test]
    fn test_active_hours_throttle() {
        let throttle = PublishThrottle::WhenActive {
            min_speed: 2,
            first_hour: 9,
            last_hour: 21,
        };
        let ctx = |hour, avg_speed, last_published_speed| ThrottleContext {
            hour,
            avg_speed,
            last_published_speed,
        };

        assert!(!throttle.allows(&ctx(5, 10, None)));
        assert!(!throttle.allows(&ctx(21, 10, None)));
        assert!(throttle.allows(&ctx(12, 1, None)));
        assert!(!throttle.allows(&ctx(12, 1, Some(1))));
        assert!(throttle.allows(&ctx(12, 1, Some(0))));
        assert!(throttle.allows(&ctx(12, 3, Some(3))));
        assert!(PublishThrottle::Always.allows(&ctx(3, 0, Some(0))));
    }

    #[test]
    fn test_throttle_never_holds_back_end_of_hour() {
        let log = Log::default();
        let station = StationConfig::new(
            "annie",
            SamplingConfig {
                throttle: PublishThrottle::WhenActive {
                    min_speed: 2,
                    first_hour: 9,
                    last_hour: 21,
                },
                ..SamplingConfig::DEFAULT
            },
        );
        let mut policy = policy_with(&log, &station, 0);
        policy.history_cleared = true;

        let mut acc = accumulator(&[5]);
        assert_eq!(
            block_on(policy.publish_cycle(&mut acc, 0, at(3, 30))),
            Ok(CycleOutcome::Throttled { slot: 6 })
        );
        assert!(acc.is_empty());

        let mut acc = accumulator(&[5]);
        assert!(matches!(
            block_on(policy.publish_cycle(&mut acc, 0, at(3, 55))),
            Ok(CycleOutcome::Published { slot: 11, .. })
        ));
    }
}
