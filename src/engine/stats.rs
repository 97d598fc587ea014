//! Shared scan statistics
//!
//! Thread-safe counters recording scan volume and per-date availability
//! sightings since the last report. `drain` reads and resets both fields
//! under one lock so a report always reflects a consistent window.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct StatsInner {
    scan_count: u64,
    availability: HashMap<String, u32>,
}

/// Process-wide stats aggregator, shared by all workers.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<StatsInner>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one scan iteration.
    pub fn record_scan(&self) {
        self.inner.lock().expect("stats lock poisoned").scan_count += 1;
    }

    /// Count one availability sighting for `date` (ISO `YYYY-MM-DD`).
    pub fn record_availability(&self, date: &str) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        *inner.availability.entry(date.to_string()).or_insert(0) += 1;
    }

    /// Read and reset both counters as one unit.
    pub fn drain(&self) -> (u64, HashMap<String, u32>) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        let scans = std::mem::take(&mut inner.scan_count);
        let availability = std::mem::take(&mut inner.availability);
        (scans, availability)
    }
}
