//! Direct HTTP transport for the reservation API
//!
//! One [`DirectApi`] is built per task runner and holds the runner's
//! persistent connection pool; every scan iteration reuses it. The base
//! URL can be overridden to point at a mock server in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Proxy, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::headers::{booking_headers, build_request_identity};
use super::ReservationApi;
use crate::error::ApiError;
use crate::models::{CalendarResponse, SlotSearchResponse};

const DEFAULT_BASE_URL: &str = "https://api.resy.com";

/// Reservation API client bound to one account's request identity.
pub struct DirectApi {
    client: Client,
    auth_token: String,
    base_url: String,
}

impl DirectApi {
    /// Build a client with the account's identity headers installed as
    /// defaults and an optional outbound proxy.
    pub fn new(auth_token: &str, proxy: Option<Proxy>) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .default_headers(build_request_identity(auth_token))
            .gzip(true)
            .cookie_store(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            auth_token: auth_token.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different host. Used by tests with wiremock.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Map a 429 to `RateLimited`, carrying Retry-After when parseable.
    fn check_rate_limit(response: &Response) -> Result<(), ApiError> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ApiError::RateLimited { retry_after });
        }
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        Self::check_rate_limit(&response)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ReservationApi for DirectApi {
    async fn calendar(
        &self,
        venue_id: &str,
        party_size: u32,
        start: NaiveDate,
        end: NaiveDate,
        timeout: Duration,
    ) -> Result<CalendarResponse, ApiError> {
        let url = format!("{}/4/venue/calendar", self.base_url);
        self.get_json(
            &url,
            &[
                ("venue_id", venue_id.to_string()),
                ("num_seats", party_size.to_string()),
                ("start_date", start.format("%Y-%m-%d").to_string()),
                ("end_date", end.format("%Y-%m-%d").to_string()),
            ],
            timeout,
        )
        .await
    }

    async fn find_slots(
        &self,
        venue_id: &str,
        party_size: u32,
        day: NaiveDate,
        timeout: Duration,
    ) -> Result<SlotSearchResponse, ApiError> {
        let url = format!("{}/4/find", self.base_url);
        self.get_json(
            &url,
            &[
                ("lat", "0".to_string()),
                ("long", "0".to_string()),
                ("day", day.format("%Y-%m-%d").to_string()),
                ("party_size", party_size.to_string()),
                ("venue_id", venue_id.to_string()),
            ],
            timeout,
        )
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
        let url = format!("{}/3/details", self.base_url);
        let body: Value = self
            .get_json(
                &url,
                &[
                    ("day", day.format("%Y-%m-%d").to_string()),
                    ("party_size", party_size.to_string()),
                    ("x-resy-auth-token", self.auth_token.clone()),
                    ("venue_id", venue_id.to_string()),
                    ("config_id", config_token.to_string()),
                ],
                timeout,
            )
            .await?;

        Ok(body
            .pointer("/book_token/value")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn submit_booking(
        &self,
        book_token: &str,
        payment_id: i64,
        timeout: Duration,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/3/book", self.base_url);
        let payment = serde_json::json!({ "id": payment_id }).to_string();
        let form = [
            ("book_token", book_token),
            ("struct_payment_method", payment.as_str()),
            ("source_id", "resy.com-venue-details"),
        ];

        let response = self
            .client
            .post(&url)
            .headers(booking_headers(&self.auth_token))
            .form(&form)
            .timeout(timeout)
            .send()
            .await?;

        Self::check_rate_limit(&response)?;

        // Rejections come back as structured JSON on non-2xx statuses, so
        // the body is surfaced regardless of status.
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}
