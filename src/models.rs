//! Core data structures for the tably engine
//!
//! `Task` is the immutable per-campaign configuration handed to one runner.
//! The wire types mirror the reservation API's JSON payloads; unknown
//! fields are ignored so upstream additions never break a scan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable configuration for one booking campaign.
///
/// Created once at startup from [`crate::config::Settings`] and owned
/// exclusively by its runner for the runner's lifetime.
#[derive(Debug, Clone)]
pub struct Task {
    /// Venue identifier at the reservation service
    pub venue_id: String,

    /// Number of guests
    pub party_size: u32,

    /// JWT auth token for the account making the booking
    pub auth_token: String,

    /// Payment method identifier submitted with the booking
    pub payment_id: i64,

    /// Earliest acceptable slot hour (inclusive, 24h clock)
    pub start_time: u32,

    /// Latest acceptable slot hour (inclusive, 24h clock)
    pub end_time: u32,

    /// Minimum days from today a date must be to attempt it
    pub min_days_out: i64,

    /// Maximum days from today; also the burst-mode target offset
    pub max_days_out: i64,

    /// Burst window start, `HH:MM[:SS]` in the reference timezone
    pub burst_start: String,

    /// Burst window end, `HH:MM[:SS]` in the reference timezone
    pub burst_end: String,

    /// Poll delay inside the burst window
    pub burst_delay: Duration,

    /// Poll delay outside the burst window
    pub idle_delay: Duration,

    /// Per-request timeout inside the burst window (fail fast, retry)
    pub burst_timeout: Duration,

    /// Per-request timeout outside the burst window
    pub idle_timeout: Duration,

    /// Consecutive failures before the long pause kicks in
    pub max_retries: u32,

    /// Initial backoff after a transient failure
    pub base_backoff: Duration,

    /// Backoff cap, also the long-pause duration after `max_retries`
    pub max_backoff: Duration,
}

/// A bookable slot that survived hour-window filtering.
///
/// Ephemeral: produced from one slot-search response and consumed by the
/// booking sequencer in the same scan cycle.
#[derive(Debug, Clone)]
pub struct CandidateSlot {
    /// Display time, `HH:MM`
    pub time: String,

    /// Opaque booking-configuration token from the slot payload
    pub config_token: String,

    /// The raw slot record, kept for logging
    pub raw: RawSlot,
}

/// Terminal result of a task runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerOutcome {
    /// A reservation was booked; the runner is done
    Booked,

    /// The auth token was invalid or expired at startup
    Aborted,
}

// ============================================================================
// Wire types
// ============================================================================

/// Calendar query response: one entry per date in the requested range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarResponse {
    #[serde(default)]
    pub scheduled: Vec<CalendarDay>,
}

/// One calendar date with its availability flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub inventory: Inventory,
}

/// Availability flags for a calendar date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub reservation: String,
}

impl CalendarDay {
    /// Whether this date is open for reservations
    pub fn is_available(&self) -> bool {
        self.inventory.reservation == "available"
    }
}

/// Slot-search response for a single date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSearchResponse {
    #[serde(default)]
    pub results: SlotResults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotResults {
    #[serde(default)]
    pub venues: Vec<VenueSlots>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSlots {
    #[serde(default)]
    pub slots: Vec<RawSlot>,
}

/// One raw slot record from a slot search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSlot {
    #[serde(default)]
    pub config: SlotConfig,
}

/// Booking-configuration token carrier; the token encodes the slot start
/// time as its ninth `/`-separated segment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(default)]
    pub token: String,
}

impl SlotSearchResponse {
    /// Slots of the first (only) venue in the response, if any
    pub fn slots(&self) -> &[RawSlot] {
        self.results
            .venues
            .first()
            .map(|v| v.slots.as_slice())
            .unwrap_or(&[])
    }
}
