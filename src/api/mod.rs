//! Reservation service client
//!
//! This module defines the [`ReservationApi`] contract the engine polls
//! through, plus two transports: [`DirectApi`] talks to the service
//! directly, [`RelayApi`] routes the two booking operations through a local
//! pass-through relay. The runner only ever sees the trait.

pub mod client;
pub mod headers;
pub mod relay;

pub use client::DirectApi;
pub use relay::RelayApi;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::{CalendarResponse, SlotSearchResponse};

/// The four remote operations the engine depends on.
///
/// Every call carries a caller-supplied timeout; the runner picks the burst
/// or idle timeout per cycle. A 429 response surfaces as
/// [`ApiError::RateLimited`] with the server's Retry-After when present.
#[async_trait]
pub trait ReservationApi: Send + Sync {
    /// Per-date availability flags for `[start, end]`
    async fn calendar(
        &self,
        venue_id: &str,
        party_size: u32,
        start: NaiveDate,
        end: NaiveDate,
        timeout: Duration,
    ) -> Result<CalendarResponse, ApiError>;

    /// Raw slot records for one date
    async fn find_slots(
        &self,
        venue_id: &str,
        party_size: u32,
        day: NaiveDate,
        timeout: Duration,
    ) -> Result<SlotSearchResponse, ApiError>;

    /// Exchange a slot's config token for a booking token.
    ///
    /// `Ok(None)` means the service answered but issued no token; the
    /// sequencer skips the candidate.
    async fn booking_token(
        &self,
        day: NaiveDate,
        party_size: u32,
        config_token: &str,
        venue_id: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ApiError>;

    /// Submit the booking. The outcome body is returned as-is: a granted
    /// reservation carries `reservation_id` (top level or under `specs`),
    /// a rejection carries a `message`.
    async fn submit_booking(
        &self,
        book_token: &str,
        payment_id: i64,
        timeout: Duration,
    ) -> Result<Value, ApiError>;
}
