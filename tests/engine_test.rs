//! Integration tests for the task runner using wiremock
//!
//! These drive the full scan loop against a mock reservation service:
//! idle discovery through booking, burst-mode direct targeting, shared
//! rate-limit coordination, and failure backoff.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tably::api::{DirectApi, ReservationApi};
use tably::engine::runner::Stagger;
use tably::engine::timing::{Clock, REFERENCE_TZ};
use tably::engine::{GlobalBackoff, PoolContext, Stats, TaskRunner};
use tably::models::{RunnerOutcome, Task};
use tably::notify::Notifier;

/// Clock pinned to one instant so burst/idle mode and date math are
/// deterministic in tests.
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Reference-timezone instant helper (2026-09-04 is EDT)
fn et(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    REFERENCE_TZ
        .with_ymd_and_hms(2026, 9, 4, hour, min, sec)
        .unwrap()
        .with_timezone(&Utc)
}

/// Notifier that counts booking-success deliveries
#[derive(Default)]
struct CountingNotifier {
    bookings: AtomicUsize,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify_booking_success(
        &self,
        _venue_id: &str,
        _date: &str,
        _time: &str,
        _party_size: u32,
        _reservation_id: &str,
    ) {
        self.bookings.fetch_add(1, Ordering::SeqCst);
    }

    async fn notify_token_expiring(&self, _account: &str, _hours_remaining: f64) {}

    async fn notify_fatal(&self, _error: &str) {}

    async fn notify_status_report(
        &self,
        _scan_count: u64,
        _availability: &HashMap<String, u32>,
        _uptime_hours: f64,
    ) {
    }
}

/// An auth token whose `exp` is far in the future
fn test_token() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let exp = Utc::now().timestamp() + 90 * 24 * 3600;
    let body = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#).as_bytes());
    format!("{header}.{body}.sig")
}

fn test_task(party_size: u32) -> Task {
    Task {
        venue_id: "834".to_string(),
        party_size,
        auth_token: test_token(),
        payment_id: 42,
        start_time: 16,
        end_time: 23,
        min_days_out: 2,
        max_days_out: 21,
        burst_start: "08:59:50".to_string(),
        burst_end: "09:01:00".to_string(),
        burst_delay: Duration::from_millis(20),
        idle_delay: Duration::from_millis(20),
        burst_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(5),
        max_retries: 5,
        base_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(300),
    }
}

struct Harness {
    backoff: Arc<GlobalBackoff>,
    stats: Arc<Stats>,
    notifier: Arc<CountingNotifier>,
    clock: Arc<FixedClock>,
    stop: Arc<AtomicBool>,
}

impl Harness {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            backoff: Arc::new(GlobalBackoff::new()),
            stats: Arc::new(Stats::new()),
            notifier: Arc::new(CountingNotifier::default()),
            clock: Arc::new(FixedClock(now)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn runner(&self, task: Task, index: usize, server: &MockServer) -> TaskRunner {
        let api = DirectApi::new(&task.auth_token, None)
            .unwrap()
            .with_base_url(&server.uri());
        TaskRunner::new(
            task,
            index,
            Arc::new(api),
            Arc::clone(&self.backoff),
            Arc::clone(&self.stats),
            self.notifier.clone() as Arc<dyn Notifier>,
            self.clock.clone() as Arc<dyn Clock>,
            Arc::clone(&self.stop),
            Stagger {
                burst: Duration::from_millis(1),
                idle: Duration::from_millis(1),
            },
        )
    }
}

fn slot_response(times: &[&str]) -> serde_json::Value {
    let slots: Vec<_> = times
        .iter()
        .map(|t| {
            serde_json::json!({
                "config": {
                    "token": format!("rgs://resy/834/1234/2/2026-09-10/2026-09-10/{t}/2/Dining Room")
                }
            })
        })
        .collect();
    serde_json::json!({"results": {"venues": [{"slots": slots}]}})
}

/// Idle-mode end to end: one available date in range, one slot in the
/// hour window, booking granted. The runner books exactly once, records
/// the sighting, and terminates.
#[tokio::test]
async fn idle_scan_books_and_terminates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}},
                {"date": "2026-09-11", "inventory": {"reservation": "sold-out"}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/find"))
        .and(query_param("day", "2026-09-10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["18:00:00"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-1"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "reservation_id": "R1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // midday: idle mode
    let harness = Harness::new(et(12, 0, 0));
    let outcome = harness.runner(test_task(2), 0, &server).run().await;

    assert_eq!(outcome, Some(RunnerOutcome::Booked));
    assert_eq!(harness.notifier.bookings.load(Ordering::SeqCst), 1);

    let (scans, availability) = harness.stats.drain();
    assert_eq!(scans, 1);
    assert_eq!(availability.get("2026-09-10"), Some(&1));
}

/// Burst mode skips calendar discovery and targets today + max_days_out
/// directly.
#[tokio::test]
async fn burst_scan_targets_newest_day_without_calendar() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // 2026-09-04 + 21 days
    Mock::given(method("GET"))
        .and(path("/4/find"))
        .and(query_param("day", "2026-09-25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["19:30:00"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-2"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "specs": {"reservation_id": 991}
        })))
        .mount(&server)
        .await;

    // inside the burst window
    let harness = Harness::new(et(9, 0, 0));
    let outcome = harness.runner(test_task(2), 0, &server).run().await;

    assert_eq!(outcome, Some(RunnerOutcome::Booked));
    assert_eq!(harness.notifier.bookings.load(Ordering::SeqCst), 1);
}

/// A slot outside the allowed hour window is never attempted; the runner
/// keeps scanning until a conforming slot appears.
#[tokio::test]
async fn out_of_window_slots_are_not_booked() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}}
            ]
        })))
        .mount(&server)
        .await;

    // 11:00 is before the 16-23 window; first scan yields nothing
    Mock::given(method("GET"))
        .and(path("/4/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["11:00:00"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["17:00:00"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-3"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "reservation_id": "R3"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(et(12, 0, 0));
    let outcome = harness.runner(test_task(2), 0, &server).run().await;
    assert_eq!(outcome, Some(RunnerOutcome::Booked));
}

/// A 429 on the calendar imposes the shared cooldown and pauses locally;
/// a sibling runner's next request waits out the cooldown before issuing.
#[tokio::test]
async fn rate_limit_pauses_both_workers() {
    let server = MockServer::start().await;

    // task A (party 2): immediate 429 with Retry-After 2, then books
    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .and(query_param("num_seats", "2"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .and(query_param("num_seats", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}}
            ]
        })))
        .mount(&server)
        .await;

    // task B (party 3): slow empty calendar first so A's cooldown lands
    // before B finishes its first scan, then books
    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .and(query_param("num_seats", "3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"scheduled": []}))
                .set_delay(Duration::from_millis(200)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .and(query_param("num_seats", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["18:00:00"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-4"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "reservation_id": "R4"
        })))
        .mount(&server)
        .await;

    let harness = Harness::new(et(12, 0, 0));
    let runner_a = harness.runner(test_task(2), 0, &server);
    let runner_b = harness.runner(test_task(3), 1, &server);

    let started = std::time::Instant::now();
    let (outcome_a, outcome_b) = tokio::join!(runner_a.run(), runner_b.run());
    let elapsed = started.elapsed();

    assert_eq!(outcome_a, Some(RunnerOutcome::Booked));
    assert_eq!(outcome_b, Some(RunnerOutcome::Booked));
    // A slept its Retry-After locally and B waited on the shared cooldown
    assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
}

/// Consecutive server errors walk the exponential backoff ladder, then
/// the runner recovers on the next success.
#[tokio::test]
async fn transient_failures_back_off_then_recover() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["20:00:00"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-5"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "reservation_id": "R5"
        })))
        .mount(&server)
        .await;

    // max_retries 3, base 100ms, max 300ms: sleeps 100, 200, then the
    // 300ms long pause before the recovering scan
    let mut task = test_task(2);
    task.max_retries = 3;

    let harness = Harness::new(et(12, 0, 0));
    let started = std::time::Instant::now();
    let outcome = harness.runner(task, 0, &server).run().await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, Some(RunnerOutcome::Booked));
    assert!(elapsed >= Duration::from_millis(550), "{elapsed:?}");
}

/// Booking rejections advance to the next candidate; the first success
/// stops the sequence.
#[tokio::test]
async fn rejected_candidate_falls_through_to_next() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/find"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(slot_response(&["18:00:00", "19:00:00"])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-6"}
        })))
        .mount(&server)
        .await;

    // first submit declined, second granted
    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(412).set_body_json(serde_json::json!({
            "message": "Slot no longer available"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "reservation_id": "R6"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(et(12, 0, 0));
    let outcome = harness.runner(test_task(2), 0, &server).run().await;

    assert_eq!(outcome, Some(RunnerOutcome::Booked));
    assert_eq!(harness.notifier.bookings.load(Ordering::SeqCst), 1);
}

/// An expired token aborts the task before any scan.
#[tokio::test]
async fn expired_token_aborts_without_scanning() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut task = test_task(2);
    // exp in 2001
    task.auth_token = {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let body = URL_SAFE_NO_PAD.encode(br#"{"exp":1000000000}"#);
        format!("{header}.{body}.sig")
    };

    let harness = Harness::new(et(12, 0, 0));
    let outcome = harness.runner(task, 0, &server).run().await;

    assert_eq!(outcome, Some(RunnerOutcome::Aborted));
    let (scans, _) = harness.stats.drain();
    assert_eq!(scans, 0);
}

/// The stop flag ends a hunting runner at its next wake-up.
#[tokio::test]
async fn stop_flag_exits_the_loop() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": []
        })))
        .mount(&server)
        .await;

    let harness = Harness::new(et(12, 0, 0));
    let stop = Arc::clone(&harness.stop);
    let handle = tokio::spawn(harness.runner(test_task(2), 0, &server).run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.store(true, Ordering::Relaxed);

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner should exit after stop")
        .unwrap();
    assert_eq!(outcome, None);
}

/// Orchestrated pool: one worker per task, outcomes collected.
#[tokio::test]
async fn pool_runs_one_worker_per_task() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/4/venue/calendar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scheduled": [
                {"date": "2026-09-10", "inventory": {"reservation": "available"}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/4/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(slot_response(&["18:00:00"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/3/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "book_token": {"value": "bt-7"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/3/book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "reservation_id": "R7"
        })))
        .mount(&server)
        .await;

    let harness = Harness::new(et(12, 0, 0));
    let ctx = PoolContext {
        backoff: Arc::clone(&harness.backoff),
        stats: Arc::clone(&harness.stats),
        notifier: harness.notifier.clone() as Arc<dyn Notifier>,
        clock: harness.clock.clone() as Arc<dyn Clock>,
        stop: Arc::clone(&harness.stop),
        stagger: Stagger {
            burst: Duration::from_millis(1),
            idle: Duration::from_millis(1),
        },
    };

    let uri = server.uri();
    let outcomes = tably::engine::run_tasks(
        vec![test_task(2), test_task(3)],
        ctx,
        move |task| {
            Ok(Arc::new(
                DirectApi::new(&task.auth_token, None)?.with_base_url(&uri),
            ) as Arc<dyn ReservationApi>)
        },
    )
    .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| *o == RunnerOutcome::Booked));
    assert_eq!(harness.notifier.bookings.load(Ordering::SeqCst), 2);
}
