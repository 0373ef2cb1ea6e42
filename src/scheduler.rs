//! Scheduler for the daily generation trigger
//!
//! Manages the daily job with support for:
//! - `HH:MM` times compiled to cron expressions
//! - Timezone-aware scheduling
//! - Sleep/wake detection via time-jump polling
//! - Coalesced misfires (one run if within the grace period)
//! - Live rescheduling when the configured time changes

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::mpsc;

use crate::error::GenerationError;
use crate::state::AppState;
use crate::types::{Config, ExecutionTrigger, JobId};

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for scheduler loop
const POLL_INTERVAL_SECS: u64 = 30;

/// Message sent to trigger job execution
#[derive(Debug, Clone)]
pub struct SchedulerMessage {
    pub job: JobId,
    pub trigger: ExecutionTrigger,
}

/// Scheduler for the daily generation time
pub struct Scheduler {
    state: Arc<AppState>,
    sender: mpsc::Sender<SchedulerMessage>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, sender: mpsc::Sender<SchedulerMessage>) -> Self {
        Self { state, sender }
    }

    /// Start the scheduler loop
    ///
    /// Runs until the executor side of the channel is dropped. Config is re-read
    /// on every tick, and a reschedule notification cuts the wait short.
    pub async fn run(&self) {
        let mut last_check = Utc::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)) => {}
                _ = self.state.reschedule.notified() => {
                    log::info!("Daily time changed, rescheduling");
                }
            }

            if self.sender.is_closed() {
                log::info!("Executor stopped, scheduler exiting");
                return;
            }

            let now = Utc::now();

            // Detect sleep: time jumped more than 5 minutes
            let time_jump = (now - last_check).num_seconds();
            let trigger = if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for a missed run",
                    time_jump
                );
                ExecutionTrigger::Missed
            } else {
                ExecutionTrigger::Scheduled
            };

            self.check_due(now, trigger).await;
            last_check = now;
        }
    }

    /// Send the daily job if a scheduled time is due and not yet handled.
    async fn check_due(&self, now: DateTime<Utc>, trigger: ExecutionTrigger) {
        // Commands run as separate processes write the config file directly.
        self.state.reload_config_if_changed();
        let config = self.state.config();
        let last_run = self.state.get_last_scheduled_run(JobId::Daily);

        let due = match due_run(&config, now, last_run) {
            Ok(due) => due,
            Err(e) => {
                log::warn!("Daily schedule unusable: {}", e);
                return;
            }
        };

        if let Some(scheduled) = due {
            log::info!("Daily job due (scheduled for {}), triggering", scheduled);
            // Mark before sending so the next tick inside the grace window does not refire.
            self.state.set_last_scheduled_run(JobId::Daily, scheduled);
            self.trigger_job(JobId::Daily, trigger).await;
        }
    }

    /// Trigger a job execution
    async fn trigger_job(&self, job: JobId, trigger: ExecutionTrigger) {
        if self
            .sender
            .send(SchedulerMessage { job, trigger })
            .await
            .is_err()
        {
            log::error!("Failed to send scheduler message for {}", job);
        }
    }
}

/// Parse a `HH:MM` daily time (00-23, 00-59, two digits each).
pub fn parse_daily_time(value: &str) -> Result<(u32, u32), String> {
    let invalid = || format!("Invalid time '{}': expected HH:MM (00:00-23:59)", value);
    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    if hour.len() != 2 || minute.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Five-field cron expression firing every day at `HH:MM`.
pub fn daily_cron(schedule_time: &str) -> Result<String, GenerationError> {
    let (hour, minute) = parse_daily_time(schedule_time).map_err(GenerationError::Configuration)?;
    Ok(format!("{} {} * * *", minute, hour))
}

/// Parse a cron expression
pub fn parse_cron(expr: &str) -> Result<Schedule, GenerationError> {
    // The cron crate expects 6 fields (with seconds), but we use 5-field format
    let full_expr = format!("0 {}", expr);

    full_expr.parse::<Schedule>().map_err(|e| {
        GenerationError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

fn parse_timezone(name: &str) -> Result<Tz, GenerationError> {
    name.parse()
        .map_err(|_| GenerationError::Configuration(format!("Invalid timezone: {}", name)))
}

/// Latest scheduled time inside the grace window that has not run yet.
///
/// Several missed times inside the window coalesce into the latest one.
pub fn due_run(
    config: &Config,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, GenerationError> {
    let schedule = parse_cron(&daily_cron(&config.schedule_time)?)?;
    let tz = parse_timezone(&config.timezone)?;

    let grace = chrono::Duration::seconds(config.misfire_grace_secs.max(0));
    let window_start = (now - grace).with_timezone(&tz) - chrono::Duration::seconds(1);

    let latest = schedule
        .after(&window_start)
        .map(|t| t.with_timezone(&Utc))
        .take_while(|t| *t <= now)
        .last();

    Ok(latest.filter(|scheduled| match last_run {
        Some(last) => last < *scheduled,
        None => true,
    }))
}

/// Get the next scheduled daily run
pub fn get_next_run_time(config: &Config) -> Result<DateTime<Utc>, GenerationError> {
    let schedule = parse_cron(&daily_cron(&config.schedule_time)?)?;
    let tz = parse_timezone(&config.timezone)?;

    let next = schedule.upcoming(tz).next().ok_or_else(|| {
        GenerationError::Configuration("No upcoming scheduled time".to_string())
    })?;

    Ok(next.with_timezone(&Utc))
}
