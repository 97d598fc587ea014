//! Booking attempt sequencer
//!
//! Given the candidates that survived filtering, try them in order: fetch
//! a booking token, submit the booking, stop at the first success. A
//! rejected candidate is logged and the next one tried; a rate limit
//! mid-sequence pauses and abandons the rest of the cycle.

use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

use super::backoff::GlobalBackoff;
use crate::api::ReservationApi;
use crate::error::ApiError;
use crate::models::{CandidateSlot, Task};
use crate::notify::Notifier;

/// Retry-After fallback when the booking path is limited without a header
const BOOKING_RETRY_AFTER_DEFAULT: u64 = 60;

/// Pull the reservation identifier out of a booking outcome, whether it
/// sits at the top level or nested under `specs`.
fn reservation_id(outcome: &Value) -> Option<String> {
    let id = outcome
        .get("reservation_id")
        .or_else(|| outcome.pointer("/specs/reservation_id"))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Attempt the candidates in order until one books or all fail.
///
/// Returns `true` as soon as a booking succeeds; no further candidates are
/// tried after that. Returns `false` when every candidate was exhausted or
/// a rate limit cut the sequence short.
pub async fn attempt_booking(
    candidates: &[CandidateSlot],
    date: NaiveDate,
    task: &Task,
    api: &dyn ReservationApi,
    backoff: &GlobalBackoff,
    notifier: &dyn Notifier,
    timeout: Duration,
) -> bool {
    for candidate in candidates {
        info!(time = %candidate.time, "Getting book token");

        let token = match api
            .booking_token(date, task.party_size, &candidate.config_token, &task.venue_id, timeout)
            .await
        {
            Ok(Some(token)) => token,
            Ok(None) => {
                error!(time = %candidate.time, "No book token issued");
                continue;
            }
            Err(ApiError::RateLimited { retry_after }) => {
                let wait = retry_after.unwrap_or(BOOKING_RETRY_AFTER_DEFAULT);
                warn!(wait_secs = wait, "Rate limited getting book token");
                backoff.impose(Duration::from_secs(wait));
                tokio::time::sleep(Duration::from_secs(wait)).await;
                return false;
            }
            Err(e) => {
                error!(time = %candidate.time, error = %e, "Book token fetch failed");
                continue;
            }
        };

        info!(time = %candidate.time, "Attempting to book");

        let outcome = match api.submit_booking(&token, task.payment_id, timeout).await {
            Ok(outcome) => outcome,
            Err(ApiError::RateLimited { retry_after }) => {
                let wait = retry_after.unwrap_or(BOOKING_RETRY_AFTER_DEFAULT);
                warn!(wait_secs = wait, "Rate limited during booking");
                backoff.impose(Duration::from_secs(wait));
                tokio::time::sleep(Duration::from_secs(wait)).await;
                return false;
            }
            Err(e) => {
                error!(time = %candidate.time, error = %e, "Booking request failed");
                continue;
            }
        };

        if let Some(res_id) = reservation_id(&outcome) {
            info!(
                reservation_id = %res_id,
                date = %date,
                time = %candidate.time,
                party_size = task.party_size,
                "BOOKING SUCCESSFUL"
            );
            notifier
                .notify_booking_success(
                    &task.venue_id,
                    &date.format("%Y-%m-%d").to_string(),
                    &candidate.time,
                    task.party_size,
                    &res_id,
                )
                .await;
            return true;
        }

        let reason = outcome
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| outcome.to_string());
        error!(time = %candidate.time, reason = %reason, "Booking declined");
    }

    false
}
