//! Rate-limit coordination and per-task retry backoff
//!
//! A 429 from the service means a shared quota was hit, so one worker's
//! cooldown must be visible to all of them: [`GlobalBackoff`] holds a
//! single cooldown-end instant that only ever moves forward. Transient
//! failures, by contrast, are private to a worker and tracked in its
//! [`RetryState`].

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::models::Task;

/// Process-wide advisory cooldown shared by all workers.
///
/// `impose` takes the maximum of the current and the new expiry, so a
/// later-expiring cooldown is never shortened by a concurrent shorter one.
#[derive(Debug, Default)]
pub struct GlobalBackoff {
    until: Mutex<Option<Instant>>,
}

impl GlobalBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the shared cooldown to at least `cooldown` from now.
    pub fn impose(&self, cooldown: Duration) {
        let target = Instant::now() + cooldown;
        let mut until = self.until.lock().expect("backoff lock poisoned");
        match *until {
            Some(current) if current >= target => {}
            _ => *until = Some(target),
        }
    }

    /// Time left on the cooldown, zero if clear.
    pub fn remaining(&self) -> Duration {
        self.until
            .lock()
            .expect("backoff lock poisoned")
            .map(|t| t.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Wait until the shared cooldown has passed. Returns immediately when
    /// clear. Safe against concurrent `impose` calls: the remaining time is
    /// re-checked after every wake, so a cooldown extended mid-wait is
    /// still honored before returning.
    pub async fn await_clear(&self) {
        loop {
            let wait = self.remaining();
            if wait.is_zero() {
                return;
            }
            warn!(wait_secs = wait.as_secs_f64(), "Global backoff active, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

/// What a worker should do after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Sleep the current exponential backoff and keep counting
    Backoff(Duration),
    /// Max retries reached: take the long pause, counters reset
    LongPause(Duration),
}

impl FailureAction {
    pub fn delay(&self) -> Duration {
        match *self {
            FailureAction::Backoff(d) | FailureAction::LongPause(d) => d,
        }
    }
}

/// Per-task failure tracking: consecutive-failure count and the doubling
/// backoff, capped at `max_backoff`. Owned solely by one runner.
#[derive(Debug)]
pub struct RetryState {
    consecutive_failures: u32,
    current_backoff: Duration,
}

impl RetryState {
    pub fn new(task: &Task) -> Self {
        Self {
            consecutive_failures: 0,
            current_backoff: task.base_backoff,
        }
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// A scan succeeded: failure count and backoff reset.
    pub fn on_success(&mut self, task: &Task) {
        self.consecutive_failures = 0;
        self.current_backoff = task.base_backoff;
    }

    /// A transient failure occurred. Returns the sleep the worker owes
    /// before its next attempt.
    pub fn on_failure(&mut self, task: &Task) -> FailureAction {
        self.consecutive_failures += 1;

        if self.consecutive_failures >= task.max_retries {
            self.consecutive_failures = 0;
            self.current_backoff = task.base_backoff;
            return FailureAction::LongPause(task.max_backoff);
        }

        let delay = self.current_backoff;
        self.current_backoff = (self.current_backoff * 2).min(task.max_backoff);
        FailureAction::Backoff(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_retry(max_retries: u32, base_secs: u64, max_secs: u64) -> Task {
        Task {
            venue_id: "834".to_string(),
            party_size: 2,
            auth_token: String::new(),
            payment_id: 1,
            start_time: 16,
            end_time: 23,
            min_days_out: 2,
            max_days_out: 21,
            burst_start: "08:59:50".to_string(),
            burst_end: "09:01:00".to_string(),
            burst_delay: Duration::from_millis(100),
            idle_delay: Duration::from_millis(1500),
            burst_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            max_retries,
            base_backoff: Duration::from_secs(base_secs),
            max_backoff: Duration::from_secs(max_secs),
        }
    }

    #[test]
    fn backoff_ladder_doubles_capped_then_long_pauses() {
        let task = task_with_retry(5, 2, 30);
        let mut state = RetryState::new(&task);

        let mut sleeps = Vec::new();
        for _ in 0..5 {
            sleeps.push(state.on_failure(&task).delay().as_secs());
        }

        assert_eq!(sleeps, vec![2, 4, 8, 16, 30]);
        // the fifth failure was the long pause and reset the state
        assert_eq!(state.failures(), 0);
        assert_eq!(state.current_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn current_backoff_after_k_failures() {
        let task = task_with_retry(100, 2, 30);
        let mut state = RetryState::new(&task);

        // after k failures the next delay is min(base * 2^k, max)
        for expected in [2u64, 4, 8, 16, 30, 30] {
            let action = state.on_failure(&task);
            assert_eq!(action, FailureAction::Backoff(Duration::from_secs(expected)));
        }
    }

    #[test]
    fn success_resets_regardless_of_prior_failures() {
        let task = task_with_retry(10, 2, 30);
        let mut state = RetryState::new(&task);

        for _ in 0..4 {
            state.on_failure(&task);
        }
        assert_eq!(state.failures(), 4);

        state.on_success(&task);
        assert_eq!(state.failures(), 0);
        assert_eq!(state.current_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn impose_takes_monotonic_max() {
        let backoff = GlobalBackoff::new();
        backoff.impose(Duration::from_secs(10));
        backoff.impose(Duration::from_secs(3));

        let remaining = backoff.remaining();
        assert!(remaining > Duration::from_secs(8), "{remaining:?}");
        assert!(remaining <= Duration::from_secs(10));
    }

    #[test]
    fn longer_impose_extends() {
        let backoff = GlobalBackoff::new();
        backoff.impose(Duration::from_secs(3));
        backoff.impose(Duration::from_secs(10));
        assert!(backoff.remaining() > Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn await_clear_returns_immediately_when_clear() {
        let backoff = GlobalBackoff::new();
        let start = Instant::now();
        backoff.await_clear().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn await_clear_honors_extension_mid_wait() {
        let backoff = std::sync::Arc::new(GlobalBackoff::new());
        backoff.impose(Duration::from_secs(5));

        // a sibling extends the cooldown while the first worker is waiting
        let extender = std::sync::Arc::clone(&backoff);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            extender.impose(Duration::from_secs(7));
        });

        let start = Instant::now();
        backoff.await_clear().await;
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_secs(9), "{waited:?}");
        assert_eq!(backoff.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn await_clear_waits_out_the_cooldown() {
        let backoff = GlobalBackoff::new();
        backoff.impose(Duration::from_secs(7));

        let start = Instant::now();
        backoff.await_clear().await;
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_secs(7), "{waited:?}");
        assert_eq!(backoff.remaining(), Duration::ZERO);
    }
}
