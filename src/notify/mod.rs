//! Outbound notifications
//!
//! Fire-and-forget delivery of booking outcomes and status reports to a
//! Telegram chat. Delivery failures are logged and swallowed; the engine's
//! control flow never depends on a notification landing.

use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Telegram delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token
    pub bot_token: String,
    /// Target chat identifier
    pub chat_id: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Notification sink consumed by the engine.
///
/// All operations are best-effort and infallible from the caller's side.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A reservation was booked
    async fn notify_booking_success(
        &self,
        venue_id: &str,
        date: &str,
        time: &str,
        party_size: u32,
        reservation_id: &str,
    );

    /// The auth token expires within the warning window
    async fn notify_token_expiring(&self, account: &str, hours_remaining: f64);

    /// The process hit an unrecoverable error
    async fn notify_fatal(&self, error: &str);

    /// Periodic scan/availability summary
    async fn notify_status_report(
        &self,
        scan_count: u64,
        availability: &HashMap<String, u32>,
        uptime_hours: f64,
    );
}

/// Telegram-backed notifier
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Send one message; failures are logged at warn and dropped.
    async fn send(&self, text: String) {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );
        let form = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", text.as_str()),
            ("parse_mode", "HTML"),
        ];

        let result = self
            .client
            .post(&url)
            .form(&form)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Notification rejected");
            }
            Err(e) => {
                warn!(error = %e, "Notification delivery failed");
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_booking_success(
        &self,
        venue_id: &str,
        date: &str,
        time: &str,
        party_size: u32,
        reservation_id: &str,
    ) {
        let message = format!(
            "<b>RESERVATION BOOKED</b>\n\n\
             Venue: {venue_id}\n\
             Date: {date}\n\
             Time: {time}\n\
             Party Size: {party_size}\n\
             Reservation ID: {reservation_id}\n\n\
             Booked at: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.send(message).await;
    }

    async fn notify_token_expiring(&self, account: &str, hours_remaining: f64) {
        let message = format!(
            "<b>TOKEN EXPIRING SOON</b>\n\n\
             Account: {account}\n\
             Expires in: {hours_remaining:.1} hours\n\n\
             Please refresh the auth token soon."
        );
        self.send(message).await;
    }

    async fn notify_fatal(&self, error: &str) {
        let truncated: String = error.chars().take(500).collect();
        let message = format!(
            "<b>FATAL ERROR</b>\n\n\
             Error: {truncated}\n\n\
             Time: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.send(message).await;
    }

    async fn notify_status_report(
        &self,
        scan_count: u64,
        availability: &HashMap<String, u32>,
        uptime_hours: f64,
    ) {
        let mut lines = vec![
            "<b>TABLY STATUS REPORT</b>".to_string(),
            String::new(),
            format!("Uptime: {uptime_hours:.1} hours"),
            format!("Scans completed: {scan_count}"),
        ];

        if availability.is_empty() {
            lines.push("Availability seen: None".to_string());
        } else {
            lines.push("Availability seen:".to_string());
            let mut dates: Vec<_> = availability.iter().collect();
            dates.sort_by_key(|(date, _)| date.clone());
            for (date, count) in dates {
                let word = if *count == 1 { "time" } else { "times" };
                lines.push(format!("  {date}: {count} {word}"));
            }
        }

        self.send(lines.join("\n")).await;
    }
}

/// Notifier that only logs. Used when no Telegram credentials are
/// configured and as the default in tests.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_booking_success(
        &self,
        venue_id: &str,
        date: &str,
        time: &str,
        party_size: u32,
        reservation_id: &str,
    ) {
        debug!(venue_id, date, time, party_size, reservation_id, "booking success (notifications disabled)");
    }

    async fn notify_token_expiring(&self, account: &str, hours_remaining: f64) {
        debug!(account, hours_remaining, "token expiring (notifications disabled)");
    }

    async fn notify_fatal(&self, error: &str) {
        debug!(error, "fatal (notifications disabled)");
    }

    async fn notify_status_report(
        &self,
        scan_count: u64,
        _availability: &HashMap<String, u32>,
        uptime_hours: f64,
    ) {
        debug!(scan_count, uptime_hours, "status report (notifications disabled)");
    }
}
