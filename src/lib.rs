//! tably - Reservation availability sniper
//!
//! Continuously polls a reservation service's availability on behalf of
//! one or more concurrent tasks and books the instant a matching slot
//! appears.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Settings from environment variables and task fan-out
//! - [`engine`] - The task execution engine: runner state machine, timing
//!   policy, shared backoff, stats, slot filtering, booking sequencer
//! - [`api`] - Reservation service client (direct and relay transports)
//! - [`auth`] - Auth token inspection
//! - [`notify`] - Fire-and-forget notifications
//! - [`models`] - Core data structures and wire types
//! - [`shutdown`] - Signal wiring for the cooperative stop flag
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use tably::config::Settings;
//! use tably::engine::{self, GlobalBackoff, PoolContext, Stats, SystemClock};
//! use tably::api::{DirectApi, ReservationApi};
//! use tably::notify::NullNotifier;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     settings.validate()?;
//!     let ctx = PoolContext {
//!         backoff: Arc::new(GlobalBackoff::new()),
//!         stats: Arc::new(Stats::new()),
//!         notifier: Arc::new(NullNotifier),
//!         clock: Arc::new(SystemClock),
//!         stop: Arc::new(AtomicBool::new(false)),
//!         stagger: settings.stagger(),
//!     };
//!     let auth = settings.auth_token.clone();
//!     engine::run_tasks(settings.tasks(), ctx, move |_task| {
//!         Ok(Arc::new(DirectApi::new(&auth, None)?) as Arc<dyn ReservationApi>)
//!     })
//!     .await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod shutdown;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{DirectApi, RelayApi, ReservationApi};
    pub use crate::config::Settings;
    pub use crate::engine::{GlobalBackoff, PoolContext, Stats, SystemClock, TaskRunner};
    pub use crate::error::ApiError;
    pub use crate::models::{CandidateSlot, RunnerOutcome, Task};
    pub use crate::notify::{Notifier, NullNotifier, TelegramNotifier};
}

// Direct re-exports for convenience
pub use error::ApiError;
pub use models::{RunnerOutcome, Task};
