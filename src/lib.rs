pub mod collaborators;
pub mod commands;
pub mod context;
pub mod date_key;
pub mod error;
pub mod executor;
pub mod extract;
pub mod generator;
pub mod inject;
pub mod invoke;
pub mod prompt;
pub mod providers;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;
pub mod util;
pub mod validate;
pub mod week;

#[cfg(test)]
mod mock;

use std::sync::Arc;

use state::AppState;
use tokio::sync::mpsc;

/// Channel buffer size for scheduler messages
const SCHEDULER_CHANNEL_SIZE: usize = 32;

/// Run the scheduler, executor and stdin console until the executor loop ends.
pub async fn run_daemon(state: Arc<AppState>) {
    let config = state.config();
    match scheduler::get_next_run_time(&config) {
        Ok(next) => log::info!(
            "Daily generation at {} {} (next run {})",
            config.schedule_time,
            config.timezone,
            next
        ),
        Err(e) => log::warn!("Daily schedule unusable until fixed: {}", e),
    }

    // Create channel for scheduler -> executor communication
    let (scheduler_tx, scheduler_rx) = mpsc::channel(SCHEDULER_CHANNEL_SIZE);

    // Commands typed on stdin run against this process's state
    let console = tokio::spawn(commands::run_console(state.clone(), scheduler_tx.clone()));

    // Spawn scheduler
    let scheduler_state = state.clone();
    let scheduler = tokio::spawn(async move {
        scheduler::Scheduler::new(scheduler_state, scheduler_tx)
            .run()
            .await;
    });

    // Executor runs on this task
    executor::Executor::new(state).run(scheduler_rx).await;
    scheduler.abort();
    console.abort();
}
