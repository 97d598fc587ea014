//! Per-task polling/booking state machine
//!
//! Each runner owns one [`Task`], one HTTP connection pool, and its own
//! retry counters, and loops until it books, is aborted by an invalid
//! token at startup, or the process shuts down. Inside the burst window it
//! skips calendar discovery and targets the newest inventory day directly;
//! outside it, it scans the full configured range through the calendar
//! endpoint. Rate limits feed the shared cooldown so sibling runners back
//! off too.

use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::backoff::{FailureAction, GlobalBackoff, RetryState};
use super::booking::attempt_booking;
use super::slots::filter_slots;
use super::stats::Stats;
use super::timing::{current_delay, current_timeout, is_burst_time, Clock, REFERENCE_TZ};
use crate::api::ReservationApi;
use crate::error::ApiError;
use crate::models::{RunnerOutcome, Task};
use crate::notify::Notifier;

/// Retry-After fallback outside the burst window
const IDLE_RETRY_AFTER_DEFAULT: u64 = 60;

/// Retry-After fallback inside the burst window (recover fast)
const BURST_RETRY_AFTER_DEFAULT: u64 = 5;

fn retry_after_default(in_burst: bool) -> u64 {
    if in_burst {
        BURST_RETRY_AFTER_DEFAULT
    } else {
        IDLE_RETRY_AFTER_DEFAULT
    }
}

/// Token lifetime below which the expiry warning fires, in hours
const TOKEN_WARNING_HOURS: f64 = 24.0;

/// Named states of the scan loop. Terminal states are `Booked` and
/// `Aborted`; everything else cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    IdleScan,
    BurstScan,
    RateLimited,
    FailureBackoff,
    Booked,
    Aborted,
}

/// Per-worker stagger offsets, multiplied by the worker's index.
#[derive(Debug, Clone, Copy)]
pub struct Stagger {
    /// Offset unit inside the burst window (kept small to stay fast)
    pub burst: Duration,
    /// Offset unit outside the burst window (spread the load)
    pub idle: Duration,
}

impl Stagger {
    fn offset(&self, index: usize, in_burst: bool) -> Duration {
        let unit = if in_burst { self.burst } else { self.idle };
        unit * index as u32
    }
}

/// One task's polling/booking worker.
pub struct TaskRunner {
    task: Task,
    index: usize,
    api: Arc<dyn ReservationApi>,
    backoff: Arc<GlobalBackoff>,
    stats: Arc<Stats>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    stop: Arc<AtomicBool>,
    stagger: Stagger,
    phase: ScanPhase,
    retry: RetryState,
    scan_count: u64,
    was_in_burst: bool,
}

impl TaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task: Task,
        index: usize,
        api: Arc<dyn ReservationApi>,
        backoff: Arc<GlobalBackoff>,
        stats: Arc<Stats>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        stop: Arc<AtomicBool>,
        stagger: Stagger,
    ) -> Self {
        let retry = RetryState::new(&task);
        Self {
            task,
            index,
            api,
            backoff,
            stats,
            notifier,
            clock,
            stop,
            stagger,
            phase: ScanPhase::IdleScan,
            retry,
            scan_count: 0,
            was_in_burst: false,
        }
    }

    fn set_phase(&mut self, phase: ScanPhase) {
        if self.phase != phase {
            debug!(index = self.index, from = ?self.phase, to = ?phase, "Phase transition");
            self.phase = phase;
        }
    }

    /// Today's date in the reference timezone (day offsets are relative to
    /// the venue's day, not the host's).
    fn today(&self) -> NaiveDate {
        self.clock
            .now_utc()
            .with_timezone(&REFERENCE_TZ)
            .date_naive()
    }

    /// Sleep, then report whether the process asked us to stop.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::time::sleep(duration).await;
        self.stop.load(Ordering::Relaxed)
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run the scan loop to a terminal state. `None` means the process
    /// shut down while the task was still hunting.
    pub async fn run(mut self) -> Option<RunnerOutcome> {
        info!(
            index = self.index,
            venue_id = %self.task.venue_id,
            party_size = self.task.party_size,
            "Starting task"
        );
        info!(
            start_hour = self.task.start_time,
            end_hour = self.task.end_time,
            min_days_out = self.task.min_days_out,
            max_days_out = self.task.max_days_out,
            "Task window"
        );

        let (valid, token_msg) = crate::auth::check_expiry(&self.task.auth_token);
        if !valid {
            error!(index = self.index, "Token error: {token_msg}");
            self.set_phase(ScanPhase::Aborted);
            return Some(RunnerOutcome::Aborted);
        }
        info!(index = self.index, "{token_msg}");

        if let Some(hours) = crate::auth::hours_remaining(&self.task.auth_token) {
            if hours < TOKEN_WARNING_HOURS {
                self.notifier.notify_token_expiring("Account", hours).await;
            }
        }

        loop {
            if self.stopping() {
                info!(index = self.index, "Stop requested, exiting task");
                return None;
            }

            self.scan_count += 1;
            self.stats.record_scan();

            let in_burst =
                is_burst_time(self.clock.now_utc(), &self.task.burst_start, &self.task.burst_end);
            self.log_mode_transition(in_burst);

            let result = if in_burst {
                self.set_phase(ScanPhase::BurstScan);
                self.burst_scan().await
            } else {
                self.set_phase(ScanPhase::IdleScan);
                self.idle_scan().await
            };

            match result {
                ScanResult::Booked => {
                    self.set_phase(ScanPhase::Booked);
                    return Some(RunnerOutcome::Booked);
                }
                ScanResult::Slept => {
                    // error handling already slept; go straight to the
                    // next iteration
                    continue;
                }
                ScanResult::Continue => {}
            }

            // honor a cooldown imposed by any sibling before sleeping
            self.backoff.await_clear().await;

            let delay =
                current_delay(&self.task, in_burst) + self.stagger.offset(self.index, in_burst);
            debug!(index = self.index, delay_ms = delay.as_millis() as u64, "Scan complete, waiting");
            if self.pause(delay).await {
                info!(index = self.index, "Stop requested, exiting task");
                return None;
            }
        }
    }

    /// Log burst-mode edges once per transition, never per iteration.
    /// Returns whether an edge was crossed.
    fn log_mode_transition(&mut self, in_burst: bool) -> bool {
        let edge = in_burst != self.was_in_burst;
        if in_burst && !self.was_in_burst {
            info!(
                index = self.index,
                delay_ms = self.task.burst_delay.as_millis() as u64,
                timeout_secs = self.task.burst_timeout.as_secs(),
                target_days_out = self.task.max_days_out,
                "Entering BURST MODE"
            );
        } else if !in_burst && self.was_in_burst {
            info!(
                index = self.index,
                delay_ms = self.task.idle_delay.as_millis() as u64,
                timeout_secs = self.task.idle_timeout.as_secs(),
                "Exiting burst mode"
            );
        }
        self.was_in_burst = in_burst;
        edge
    }

    /// Burst branch: the single newest inventory day just became
    /// available, so skip calendar discovery and hit slot search for
    /// `today + max_days_out` directly.
    async fn burst_scan(&mut self) -> ScanResult {
        let timeout = current_timeout(&self.task, true);
        let target = self.today() + chrono::Duration::days(self.task.max_days_out);
        info!(index = self.index, scan = self.scan_count, target = %target, "Burst scan, direct targeting");

        let response = self
            .api
            .find_slots(&self.task.venue_id, self.task.party_size, target, timeout)
            .await;

        let response = match response {
            Ok(response) => {
                self.retry.on_success(&self.task);
                response
            }
            Err(ApiError::RateLimited { retry_after }) => {
                return self
                    .rate_limit_pause(retry_after.unwrap_or(retry_after_default(true)))
                    .await;
            }
            Err(e) if e.is_transient_failure() => return self.transient_failure(&e).await,
            Err(e) => {
                // malformed body: treat as an empty result this cycle
                warn!(index = self.index, error = %e, "Unusable slot-search response");
                return ScanResult::Continue;
            }
        };

        let candidates = filter_slots(response.slots(), &self.task);
        if candidates.is_empty() {
            return ScanResult::Continue;
        }

        let date_str = target.format("%Y-%m-%d").to_string();
        self.stats.record_availability(&date_str);
        let times: Vec<&str> = candidates.iter().map(|c| c.time.as_str()).collect();
        info!(index = self.index, date = %date_str, slots = ?times, "Found bookable slots");

        if attempt_booking(
            &candidates,
            target,
            &self.task,
            self.api.as_ref(),
            &self.backoff,
            self.notifier.as_ref(),
            timeout,
        )
        .await
        {
            ScanResult::Booked
        } else {
            ScanResult::Continue
        }
    }

    /// Idle branch: calendar discovery over the full window, then slot
    /// search per available date.
    async fn idle_scan(&mut self) -> ScanResult {
        let timeout = current_timeout(&self.task, false);
        let today = self.today();
        let end = today + chrono::Duration::days(self.task.max_days_out);
        info!(index = self.index, scan = self.scan_count, "Checking calendar");

        let calendar = match self
            .api
            .calendar(&self.task.venue_id, self.task.party_size, today, end, timeout)
            .await
        {
            Ok(calendar) => {
                self.retry.on_success(&self.task);
                calendar
            }
            Err(ApiError::RateLimited { retry_after }) => {
                return self
                    .rate_limit_pause(retry_after.unwrap_or(retry_after_default(false)))
                    .await;
            }
            Err(e) if e.is_transient_failure() => return self.transient_failure(&e).await,
            Err(e) => {
                // malformed body: treat as an empty result this cycle
                warn!(index = self.index, error = %e, "Unusable calendar response");
                return ScanResult::Continue;
            }
        };

        let available: Vec<NaiveDate> = calendar
            .scheduled
            .iter()
            .filter(|day| day.is_available())
            .map(|day| day.date)
            .filter(|date| {
                let days_until = (*date - today).num_days();
                self.task.min_days_out <= days_until && days_until <= self.task.max_days_out
            })
            .collect();

        if available.is_empty() {
            return ScanResult::Continue;
        }

        // report the whole set up front, before any slot searches
        info!(
            index = self.index,
            count = available.len(),
            dates = ?available.iter().take(5).map(|d| d.to_string()).collect::<Vec<_>>(),
            "Found available dates"
        );

        for date in available {
            if self.stopping() {
                return ScanResult::Continue;
            }

            debug!(index = self.index, date = %date, "Searching slots");
            let response = match self
                .api
                .find_slots(&self.task.venue_id, self.task.party_size, date, timeout)
                .await
            {
                Ok(response) => response,
                Err(ApiError::RateLimited { retry_after }) => {
                    // abandon the remaining dates for this cycle
                    return self
                        .rate_limit_pause(retry_after.unwrap_or(retry_after_default(false)))
                        .await;
                }
                Err(e) => {
                    warn!(index = self.index, date = %date, error = %e, "Slot search failed");
                    continue;
                }
            };

            let candidates = filter_slots(response.slots(), &self.task);
            if candidates.is_empty() {
                continue;
            }

            let date_str = date.format("%Y-%m-%d").to_string();
            self.stats.record_availability(&date_str);
            let times: Vec<&str> = candidates.iter().map(|c| c.time.as_str()).collect();
            info!(index = self.index, date = %date_str, slots = ?times, "Found bookable slots");

            if attempt_booking(
                &candidates,
                date,
                &self.task,
                self.api.as_ref(),
                &self.backoff,
                self.notifier.as_ref(),
                timeout,
            )
            .await
            {
                return ScanResult::Booked;
            }
        }

        ScanResult::Continue
    }

    /// 429 handling shared by both branches: mark the shared cooldown,
    /// take the local pause, re-loop without counting a failure.
    async fn rate_limit_pause(&mut self, retry_after: u64) -> ScanResult {
        self.set_phase(ScanPhase::RateLimited);
        warn!(index = self.index, retry_after_secs = retry_after, "Rate limited (429)");
        self.backoff.impose(Duration::from_secs(retry_after));
        self.pause(Duration::from_secs(retry_after)).await;
        ScanResult::Slept
    }

    /// Transient failure handling: count it, take the backoff or the long
    /// pause, re-loop.
    async fn transient_failure(&mut self, error: &ApiError) -> ScanResult {
        self.set_phase(ScanPhase::FailureBackoff);
        match self.retry.on_failure(&self.task) {
            FailureAction::Backoff(delay) => {
                warn!(
                    index = self.index,
                    error = %error,
                    retry = self.retry.failures(),
                    max_retries = self.task.max_retries,
                    delay_secs = delay.as_secs(),
                    "Transient failure, backing off"
                );
                self.pause(delay).await;
            }
            FailureAction::LongPause(delay) => {
                error!(
                    index = self.index,
                    error = %error,
                    pause_secs = delay.as_secs(),
                    "Max retries reached, pausing"
                );
                self.pause(delay).await;
            }
        }
        ScanResult::Slept
    }
}

/// Outcome of one scan iteration's branch body
enum ScanResult {
    /// A booking succeeded; the runner is done
    Booked,
    /// Nothing booked; take the normal inter-scan delay
    Continue,
    /// Error handling already slept; skip the normal delay
    Slept,
}
