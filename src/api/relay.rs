//! Relay transport for the booking operations
//!
//! An optional local pass-through service can forward the booking-token and
//! booking-submit calls on the engine's behalf (useful when those two calls
//! must leave from a different network path than the availability polling).
//! The relay accepts the same logical payload over a local POST and proxies
//! it upstream unchanged, so this transport substitutes [`DirectApi`] under
//! the identical [`ReservationApi`] contract. Availability reads always go
//! direct.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::{DirectApi, ReservationApi};
use crate::error::ApiError;
use crate::models::{CalendarResponse, SlotSearchResponse};

/// Booking-token request forwarded to the relay
#[derive(Debug, Serialize)]
struct DetailsRequest<'a> {
    day: String,
    party_size: u32,
    config_token: &'a str,
    restaurant_id: &'a str,
    headers: RelayIdentity<'a>,
}

/// Booking-submit request forwarded to the relay
#[derive(Debug, Serialize)]
struct ReservationRequest<'a> {
    book_token: &'a str,
    payment_id: i64,
    headers: RelayIdentity<'a>,
}

/// The identity subset the relay re-attaches upstream
#[derive(Debug, Serialize)]
struct RelayIdentity<'a> {
    #[serde(rename = "Authorization")]
    authorization: &'static str,
    #[serde(rename = "X-Resy-Auth-Token")]
    auth_token: &'a str,
}

impl<'a> RelayIdentity<'a> {
    fn new(auth_token: &'a str) -> Self {
        Self {
            authorization: super::headers::API_KEY,
            auth_token,
        }
    }
}

/// Transport that routes the two booking calls through a local relay.
pub struct RelayApi {
    direct: DirectApi,
    relay: Client,
    relay_url: String,
    auth_token: String,
}

impl RelayApi {
    pub fn new(direct: DirectApi, relay_url: &str, auth_token: &str) -> Self {
        Self {
            direct,
            relay: Client::new(),
            relay_url: relay_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    async fn post_relay<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .relay
            .post(format!("{}{endpoint}", self.relay_url))
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ApiError::RateLimited { retry_after });
        }

        Ok(response)
    }
}

#[async_trait]
impl ReservationApi for RelayApi {
    async fn calendar(
        &self,
        venue_id: &str,
        party_size: u32,
        start: NaiveDate,
        end: NaiveDate,
        timeout: Duration,
    ) -> Result<CalendarResponse, ApiError> {
        self.direct
            .calendar(venue_id, party_size, start, end, timeout)
            .await
    }

    async fn find_slots(
        &self,
        venue_id: &str,
        party_size: u32,
        day: NaiveDate,
        timeout: Duration,
    ) -> Result<SlotSearchResponse, ApiError> {
        self.direct
            .find_slots(venue_id, party_size, day, timeout)
            .await
    }

    async fn booking_token(
        &self,
        day: NaiveDate,
        party_size: u32,
        config_token: &str,
        venue_id: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ApiError> {
        let request = DetailsRequest {
            day: day.format("%Y-%m-%d").to_string(),
            party_size,
            config_token,
            restaurant_id: venue_id,
            headers: RelayIdentity::new(&self.auth_token),
        };

        let response = self.post_relay("/api/get-details", &request, timeout).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;
        Ok(body
            .get("response_value")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn submit_booking(
        &self,
        book_token: &str,
        payment_id: i64,
        timeout: Duration,
    ) -> Result<Value, ApiError> {
        let request = ReservationRequest {
            book_token,
            payment_id,
            headers: RelayIdentity::new(&self.auth_token),
        };

        let response = self
            .post_relay("/api/book-reservation", &request, timeout)
            .await?;

        // The relay passes the upstream body through on any status; a
        // rejection is a structured body, not a transport error.
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}
