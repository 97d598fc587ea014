//! Slot filtering
//!
//! A slot's booking-configuration token is a `/`-separated path whose
//! ninth segment is the slot start time (`HH:MM:SS`). Filtering keeps the
//! slots whose hour falls inside the task's allowed window, in response
//! order; anything unparseable is dropped silently.

use crate::models::{CandidateSlot, RawSlot, Task};

/// Segment of the config token that carries the slot start time
const TIME_SEGMENT: usize = 8;

/// Extract the bookable candidates allowed by the task's hour window.
pub fn filter_slots(raw_slots: &[RawSlot], task: &Task) -> Vec<CandidateSlot> {
    raw_slots
        .iter()
        .filter_map(|slot| {
            let token = &slot.config.token;
            let time_part = token.split('/').nth(TIME_SEGMENT)?;
            let hour: u32 = time_part.split(':').next()?.parse().ok()?;

            if task.start_time <= hour && hour <= task.end_time {
                Some(CandidateSlot {
                    time: time_part.chars().take(5).collect(),
                    config_token: token.clone(),
                    raw: slot.clone(),
                })
            } else {
                None
            }
        })
        .collect()
}
