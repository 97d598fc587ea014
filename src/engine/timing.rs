//! Dual-cadence timing policy
//!
//! The reservation service releases new inventory at a known time of day.
//! Inside that burst window the engine polls aggressively with short
//! timeouts; outside it, a relaxed idle cadence keeps watch over the full
//! date range. All burst decisions are made in a fixed reference timezone,
//! never the host's local zone.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;

use crate::models::Task;

/// Timezone the burst window is expressed in
pub const REFERENCE_TZ: Tz = chrono_tz::America::New_York;

/// Replaceable current-time source so window logic is testable without
/// real sleeping.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parse `HH:MM` or `HH:MM:SS`; seconds default to zero.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Whether `now`, evaluated in the reference timezone, falls inside
/// `[burst_start, burst_end]` inclusive.
///
/// Unparseable bounds disable burst mode rather than erroring.
pub fn is_burst_time(now: DateTime<Utc>, burst_start: &str, burst_end: &str) -> bool {
    let (Some(start), Some(end)) = (parse_time_of_day(burst_start), parse_time_of_day(burst_end))
    else {
        return false;
    };

    let current = now.with_timezone(&REFERENCE_TZ).time();
    start <= current && current <= end
}

/// Poll delay for the current mode.
pub fn current_delay(task: &Task, in_burst: bool) -> Duration {
    if in_burst {
        task.burst_delay
    } else {
        task.idle_delay
    }
}

/// Per-request timeout for the current mode.
pub fn current_timeout(task: &Task, in_burst: bool) -> Duration {
    if in_burst {
        task.burst_timeout
    } else {
        task.idle_timeout
    }
}
