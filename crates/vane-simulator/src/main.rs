//! Desktop simulator for the vane wind telemetry engine.
//!
//! Runs the real vane-core tasks on the std Embassy executor against
//! synthetic hardware:
//!
//! - an anemometer producing gusty pulse trains, with contact bounce on some
//!   edges;
//! - a vane slowly veering through north;
//! - a camera that periodically holds the transport for an image upload;
//! - a wall clock running fast enough that an hour of reports (and the
//!   end-of-hour health report) goes by in a few minutes.
//!
//! Reports are printed through the log. Run with `RUST_LOG=debug` to see
//! every direction sample and pulse count.

use std::convert::Infallible;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Duration, Timer};
use embedded_hal::digital::{ErrorType, OutputPin};
use log::{error, info, trace};
use static_cell::StaticCell;

use vane_core::clock::{WallClock, WallTime};
use vane_core::config::{REPORTS_PER_HOUR, SamplingConfig, StationConfig};
use vane_core::engine::{self, WindShared};
use vane_core::indicator::RgbIndicator;
use vane_core::report::{HealthReporter, PublishPolicy};
use vane_core::sensors::{Adc, AdcChannel, AnalogSensors, SensorError, SharedAdc};
use vane_core::transport::{TransferGate, Transport, TransportError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One simulated minute every 5 real seconds
const SAMPLING: SamplingConfig = SamplingConfig {
    cycle_period_ms: 5_000,
    window_ms: 1_500,
    direction_start_delay_ms: 250,
    direction_interval_ms: 100,
    health_report_delay_ms: 250,
    transfer_poll_interval_ms: 50,
    ..SamplingConfig::DEFAULT
};

const STATION: StationConfig<'static> =
    StationConfig::new(env!("VANE_PRIMARY_TOPIC"), SAMPLING);

/// Simulated seconds per real second
const TIME_SCALE: u64 = 60_000 / SAMPLING.cycle_period_ms as u64;

/// Seconds between simulated image uploads
const CAMERA_PERIOD_SECS: u64 = 47;
const CAMERA_UPLOAD_MS: u64 = 3_000;

/// Every n-th anemometer edge is followed by a bounce
const BOUNCE_EVERY: u32 = 5;
const BOUNCE_MS: u64 = 2;

/// Every n-th publish is dropped by the fake broker
const DROP_EVERY: u32 = 40;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

static WIND: WindShared = WindShared::new(&SAMPLING);

static ADC: StaticCell<Mutex<CriticalSectionRawMutex, SimAdc>> = StaticCell::new();

type SimSensors = AnalogSensors<SharedAdc<'static, SimAdc>>;
type SimIndicator = RgbIndicator<SimPin, SimPin, SimPin>;
type SimPolicy = PublishPolicy<
    'static,
    LogTransport,
    &'static TransferGate,
    Delay,
    SimSensors,
    REPORTS_PER_HOUR,
>;

// ---------------------------------------------------------------------------
// Synthetic weather
// ---------------------------------------------------------------------------

/// Wind speed in report units at `t` seconds after start.
fn wind_speed(t: f64) -> f64 {
    let base = 8.0 + 5.0 * (t / 40.0).sin();
    let gust = 6.0 * ((t * 0.9).sin() * (t * 0.37).cos()).max(0.0);
    (base + gust).max(0.0)
}

/// Wind direction in degrees, veering through north and back.
fn wind_direction(t: f64) -> f64 {
    (360.0 + 60.0 * (t / 90.0).sin() + 8.0 * (t * 1.3).sin()).rem_euclid(360.0)
}

/// ADC with a vane, a battery divider and a thermistor on its channels
struct SimAdc {
    start: Instant,
}

impl SimAdc {
    fn new(start: Instant) -> Self {
        Self { start }
    }
}

impl Adc for SimAdc {
    async fn init(&mut self) -> Result<(), SensorError> {
        info!("Simulated ADC ready");
        Ok(())
    }

    async fn read_millivolts(&mut self, channel: AdcChannel) -> Result<u16, SensorError> {
        let t = self.start.elapsed().as_secs_f64();
        let max_mv = SAMPLING.max_direction_voltage_mv as f64;

        let mv = match channel {
            AdcChannel::WindDirection => {
                let raw = (wind_direction(t) - SAMPLING.north_offset_deg as f64).rem_euclid(360.0);
                raw * max_mv / 360.0
            }
            AdcChannel::BatteryVoltage => {
                // Slow discharge from 4.1 V, seen through the divider
                let battery_mv = (4_100.0 - t * 0.5).max(3_300.0);
                battery_mv * 10.0 / 14.7
            }
            AdcChannel::Temperature => {
                let celsius = 18.0 + 6.0 * (t / 300.0).sin();
                2_100.0 + celsius * (1_558.0 - 2_100.0) / 50.0
            }
        };
        trace!("{}: {:.0} mV", channel.name(), mv);
        Ok(mv as u16)
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Broker that prints every publish
struct LogTransport {
    publishes: u32,
}

impl Transport for LogTransport {
    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), TransportError> {
        self.publishes += 1;
        if self.publishes % DROP_EVERY == 0 {
            return Err(TransportError::Timeout {
                topic_len: topic.len(),
            });
        }

        if payload.is_empty() {
            trace!("clear {}", topic);
        } else {
            info!(
                "publish {} (retain={}): {}",
                topic,
                retain,
                String::from_utf8_lossy(payload)
            );
        }
        Ok(())
    }
}

/// Wall clock running `TIME_SCALE` times faster than real time
struct SimClock {
    start: Instant,
    start_unix: u64,
}

impl SimClock {
    fn new() -> Self {
        let start_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            start: Instant::now(),
            start_unix,
        }
    }
}

impl WallClock for SimClock {
    fn now(&self) -> WallTime {
        let elapsed = self.start.elapsed().as_secs() * TIME_SCALE;
        wall_time_from_unix(self.start_unix + elapsed)
    }
}

/// UTC broken-down time for a Unix timestamp.
fn wall_time_from_unix(secs: u64) -> WallTime {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    // Days to civil date, proleptic Gregorian
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

    WallTime::new(
        year as u16,
        month as u8,
        day as u8,
        (rem / 3_600) as u8,
        (rem % 3_600 / 60) as u8,
        (rem % 60) as u8,
    )
}

/// Status LED pin that logs its changes
struct SimPin {
    name: &'static str,
    high: bool,
}

impl SimPin {
    fn new(name: &'static str) -> Self {
        Self { name, high: false }
    }

    fn set(&mut self, high: bool) {
        if self.high != high {
            trace!("{} LED {}", self.name, if high { "on" } else { "off" });
        }
        self.high = high;
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn sampling_task(mut vane: SimSensors, mut indicator: SimIndicator) {
    engine::run_sampling(&WIND, &SAMPLING, &mut vane, &mut indicator).await;
}

#[embassy_executor::task]
async fn publisher_task(mut policy: SimPolicy, clock: SimClock) {
    engine::run_publisher(&WIND, &mut policy, &clock).await;
}

/// Pulse train from the cups, one edge per rotation.
#[embassy_executor::task]
async fn anemometer_task(start: Instant) {
    let mut edges: u32 = 0;
    loop {
        let speed = wind_speed(start.elapsed().as_secs_f64());
        let pulses_per_sec = speed / SAMPLING.calibration_scale as f64;
        if pulses_per_sec < 0.2 {
            Timer::after(Duration::from_millis(500)).await;
            continue;
        }

        Timer::after(Duration::from_micros((1e6 / pulses_per_sec) as u64)).await;
        WIND.on_edge();
        edges = edges.wrapping_add(1);

        if edges % BOUNCE_EVERY == 0 {
            Timer::after(Duration::from_millis(BOUNCE_MS)).await;
            if !WIND.on_edge() {
                trace!("bounce rejected");
            }
        }
    }
}

/// Periodic image upload holding the transport.
#[embassy_executor::task]
async fn camera_task() {
    loop {
        Timer::after(Duration::from_secs(CAMERA_PERIOD_SECS)).await;
        info!("Camera: sending photo");
        WIND.transfer_gate().set_busy(true);
        Timer::after(Duration::from_millis(CAMERA_UPLOAD_MS)).await;
        WIND.transfer_gate().set_busy(false);
        info!("Camera: photo sent");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("vane simulator, publishing under {}", STATION.primary_topic);

    let start = Instant::now();
    let adc = ADC.init(Mutex::new(SimAdc::new(start)));

    let mut vane = AnalogSensors::new(SharedAdc::new(adc));
    if let Err(e) = engine::init::<REPORTS_PER_HOUR, _>(&STATION.sampling, &mut vane).await {
        error!("Wind engine not started: {}", e);
        return;
    }

    let indicator = RgbIndicator::new(SimPin::new("red"), SimPin::new("green"), SimPin::new("blue"));
    let health = HealthReporter::new(AnalogSensors::new(SharedAdc::new(adc)));
    let policy = PublishPolicy::new(
        &STATION,
        LogTransport { publishes: 0 },
        WIND.transfer_gate(),
        Delay,
        health,
    );

    spawner.spawn(anemometer_task(start)).unwrap();
    spawner.spawn(camera_task()).unwrap();
    spawner.spawn(publisher_task(policy, SimClock::new())).unwrap();
    spawner.spawn(sampling_task(vane, indicator)).unwrap();
}
