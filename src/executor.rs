//! Job execution engine
//!
//! Jobs arrive over the scheduler channel and run one at a time. The daily job
//! makes sure the current week has a plan (when week planning is on), then
//! generates today's record.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::date_key::DateKey;
use crate::error::GenerationError;
use crate::generator::DayRequest;
use crate::scheduler::SchedulerMessage;
use crate::state::AppState;
use crate::types::{ExecutionTrigger, JobId, ScheduleRecord};

/// Executor drains the scheduler channel
pub struct Executor {
    state: Arc<AppState>,
}

impl Executor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the executor loop
    ///
    /// Listens for job requests from the scheduler or manual triggers.
    pub async fn run(&self, mut receiver: mpsc::Receiver<SchedulerMessage>) {
        while let Some(msg) = receiver.recv().await {
            log::info!("Executing job {} (trigger: {:?})", msg.job, msg.trigger);

            if let Err(e) = self.execute_job(msg.job, msg.trigger).await {
                log::error!("Job {} failed: {}", msg.job, e);
            }
        }
    }

    /// Execute a job
    pub async fn execute_job(
        &self,
        job: JobId,
        trigger: ExecutionTrigger,
    ) -> Result<ScheduleRecord, GenerationError> {
        match job {
            JobId::Daily => self.execute_daily(trigger).await,
        }
    }

    async fn execute_daily(
        &self,
        trigger: ExecutionTrigger,
    ) -> Result<ScheduleRecord, GenerationError> {
        let started_at = Utc::now();
        let config = self.state.config();
        let tz = config.timezone.parse().map_err(|_| {
            GenerationError::Configuration(format!("Invalid timezone: {}", config.timezone))
        })?;
        let today = DateKey::today_in(tz).date();

        if config.week_planning {
            if let Err(e) = self.state.generator.ensure_week(&config, today).await {
                log::warn!("Week plan unavailable for {}: {}", today, e);
            }
        }

        let record = self
            .state
            .generator
            .generate_day(&config, today, DayRequest::default())
            .await?;

        let elapsed = (Utc::now() - started_at).num_milliseconds().max(0);
        log::info!(
            "Daily job ({:?}) finished for {} in {}ms: {:?}",
            trigger,
            record.date,
            elapsed,
            record.status
        );

        Ok(record)
    }
}

/// Request a manual job execution
pub fn request_job_execution(
    sender: &mpsc::Sender<SchedulerMessage>,
    job: JobId,
) -> Result<(), String> {
    sender
        .try_send(SchedulerMessage {
            job,
            trigger: ExecutionTrigger::Manual,
        })
        .map_err(|e| format!("Failed to queue job: {}", e))
}
