//! Task pool orchestration
//!
//! Launches one runner per task, each with a distinct index used for
//! stagger offsets, and waits for all of them. A runner that panics is
//! logged and does not take its siblings down; the only cross-task state
//! is the shared backoff cooldown and the stats aggregator.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::backoff::GlobalBackoff;
use super::runner::{Stagger, TaskRunner};
use super::stats::Stats;
use super::timing::Clock;
use crate::api::ReservationApi;
use crate::error::ApiError;
use crate::models::{RunnerOutcome, Task};
use crate::notify::Notifier;

/// Collaborators shared by every runner in the pool.
pub struct PoolContext {
    pub backoff: Arc<GlobalBackoff>,
    pub stats: Arc<Stats>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub stop: Arc<AtomicBool>,
    pub stagger: Stagger,
}

/// Run every task to completion, one concurrent worker per task.
///
/// `make_api` builds each worker's private API transport (and with it the
/// worker's own connection pool). Returns the terminal outcomes of the
/// workers that reached one.
pub async fn run_tasks<F>(
    tasks: Vec<Task>,
    ctx: PoolContext,
    make_api: F,
) -> Vec<RunnerOutcome>
where
    F: Fn(&Task) -> Result<Arc<dyn ReservationApi>, ApiError>,
{
    info!(count = tasks.len(), "Starting tasks concurrently with staggered timing");

    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        let api = match make_api(&task) {
            Ok(api) => api,
            Err(e) => {
                error!(index, error = %e, "Failed to build API client for task");
                continue;
            }
        };

        let runner = TaskRunner::new(
            task,
            index,
            api,
            Arc::clone(&ctx.backoff),
            Arc::clone(&ctx.stats),
            Arc::clone(&ctx.notifier),
            Arc::clone(&ctx.clock),
            Arc::clone(&ctx.stop),
            ctx.stagger,
        );
        set.spawn(runner.run());
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {} // stopped by shutdown
            Err(e) => {
                // one worker failing must never abort its siblings
                error!(error = %e, "Task worker failed");
            }
        }
    }

    outcomes
}
