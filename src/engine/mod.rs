//! Task execution engine
//!
//! The per-task polling/booking state machine and everything it leans on:
//! dual-cadence timing, shared rate-limit cooldown, retry backoff, slot
//! filtering, the booking sequencer, and the task pool orchestrator.

pub mod backoff;
pub mod booking;
pub mod pool;
pub mod runner;
pub mod slots;
pub mod stats;
pub mod timing;

pub use backoff::{FailureAction, GlobalBackoff, RetryState};
pub use pool::{run_tasks, PoolContext};
pub use runner::{ScanPhase, Stagger, TaskRunner};
pub use slots::filter_slots;
pub use stats::Stats;
pub use timing::{current_delay, current_timeout, is_burst_time, Clock, SystemClock};
