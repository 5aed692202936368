//! Hourly wind reports
//!
//! [`aggregator`] keeps one summary per report slot of the current hour,
//! [`publish`] decides when the hour's report goes out and [`health`] builds
//! the battery/temperature report sent alongside the last slot of each hour.
//! [`recent`] is the one-line latest reading sent after every wind report.

pub mod aggregator;
pub mod health;
pub mod publish;
pub mod recent;

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

pub use aggregator::{ReportAggregator, ReportSlot};
pub use health::HealthReporter;
pub use publish::{CycleOutcome, PublishError, PublishPolicy, PublishThrottle, ThrottleContext};
pub use recent::RecentReading;

/// Longest topic any report is published to
pub const TOPIC_CAPACITY: usize = 96;

/// Largest report payload
pub const PAYLOAD_CAPACITY: usize = 512;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    #[error("report text exceeds {capacity} bytes")]
    Overflow { capacity: usize },
}

/// Topic of the retained wind report for `hour`: `<primary>/wind/<hh>`.
pub fn wind_topic(primary_topic: &str, hour: u8) -> Result<String<TOPIC_CAPACITY>, ReportError> {
    let mut topic = String::new();
    write!(topic, "{}/wind/{:02}", primary_topic, hour).map_err(|_| ReportError::Overflow {
        capacity: TOPIC_CAPACITY,
    })?;
    Ok(topic)
}

/// Topic of the retained health report: `<primary>/health`.
pub fn health_topic(primary_topic: &str) -> Result<String<TOPIC_CAPACITY>, ReportError> {
    let mut topic = String::new();
    write!(topic, "{}/health", primary_topic).map_err(|_| ReportError::Overflow {
        capacity: TOPIC_CAPACITY,
    })?;
    Ok(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(wind_topic("station/annie", 7).unwrap().as_str(), "station/annie/wind/07");
        assert_eq!(wind_topic("station/annie", 23).unwrap().as_str(), "station/annie/wind/23");
        assert_eq!(health_topic("station/annie").unwrap().as_str(), "station/annie/health");
    }

    #[test]
    fn test_overlong_primary_topic_is_rejected() {
        let primary = core::str::from_utf8(&[b'x'; TOPIC_CAPACITY]).unwrap();
        assert_eq!(
            wind_topic(primary, 0),
            Err(ReportError::Overflow {
                capacity: TOPIC_CAPACITY
            })
        );
    }
}
