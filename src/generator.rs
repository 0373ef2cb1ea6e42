//! Generation orchestrator.
//!
//! Owns the day and week stores and the single generation slot. A call that
//! finds the slot taken is rejected with `AlreadyInProgress`; it never waits.
//! Once inside, every outcome ends in a persisted record: the validated one on
//! success, a degraded `failed` record otherwise.

use std::collections::HashSet;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::collaborators::Collaborators;
use crate::context::{assemble, persona_desc, pick_diversity, recent_styles};
use crate::date_key::DateKey;
use crate::error::GenerationError;
use crate::extract::extract_object;
use crate::invoke::{resolve_model, ModelInvoker};
use crate::prompt::build_day_prompt;
use crate::store::{ScheduleStore, WeekStore};
use crate::types::{Config, ScheduleRecord, ScheduleStatus};
use crate::validate::{build_repair_prompt, validate, MAX_REPAIR_ATTEMPTS};
use crate::week::{build_week_prompt, WeekKey, WeekPlan};

/// Options for a single day generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayRequest<'a> {
    /// Conversation whose recent turns feed the context.
    pub conversation_key: Option<&'a str>,
    /// Free text appended verbatim to the prompt.
    pub amendment: Option<&'a str>,
}

pub struct Generator {
    schedules: ScheduleStore,
    weeks: WeekStore,
    collab: Collaborators,
    slot: Mutex<()>,
}

impl Generator {
    pub fn new(schedules: ScheduleStore, weeks: WeekStore, collab: Collaborators) -> Self {
        Self {
            schedules,
            weeks,
            collab,
            slot: Mutex::new(()),
        }
    }

    pub fn schedules(&self) -> &ScheduleStore {
        &self.schedules
    }

    pub fn weeks(&self) -> &WeekStore {
        &self.weeks
    }

    /// Generate and persist the record for `date`.
    ///
    /// Only returns `Err(AlreadyInProgress)`; every other failure is folded
    /// into a persisted `failed` record.
    pub async fn generate_day(
        &self,
        config: &Config,
        date: NaiveDate,
        request: DayRequest<'_>,
    ) -> Result<ScheduleRecord, GenerationError> {
        let _slot = self
            .slot
            .try_lock()
            .map_err(|_| GenerationError::AlreadyInProgress)?;

        let key = DateKey::from_date(date);
        log::info!("Generating day record for {}", key);

        let record = match self.run_day_pipeline(config, date, request).await {
            Ok(record) => {
                log::info!(
                    "Generated {} (style: {})",
                    key,
                    if record.outfit_style.is_empty() { "-" } else { record.outfit_style.as_str() }
                );
                record
            }
            Err(e) => {
                log::error!(
                    "Generation for {} failed: {}. {}",
                    key,
                    e,
                    e.recovery_suggestion()
                );
                ScheduleRecord::failed(key.clone())
            }
        };

        if let Err(e) = self.schedules.set(record.clone()) {
            log::error!("Failed to persist record for {}: {}", key, e);
        }

        Ok(record)
    }

    /// The stored record for `date`, generating it first when absent.
    pub async fn get_or_generate(
        &self,
        config: &Config,
        date: NaiveDate,
        conversation_key: Option<&str>,
    ) -> Result<ScheduleRecord, GenerationError> {
        if let Some(record) = self.schedules.get(DateKey::from_date(date)) {
            return Ok(record);
        }
        self.generate_day(
            config,
            date,
            DayRequest {
                conversation_key,
                amendment: None,
            },
        )
        .await
    }

    async fn run_day_pipeline(
        &self,
        config: &Config,
        date: NaiveDate,
        request: DayRequest<'_>,
    ) -> Result<ScheduleRecord, GenerationError> {
        let model = resolve_model(self.collab.providers.as_ref(), config.provider_id.as_deref())?;

        let used_styles = if config.reference_history_days == 0 {
            HashSet::new()
        } else {
            recent_styles(
                &self.schedules,
                date,
                config.reference_history_days,
                &config.pool.outfit_styles,
            )
        };
        let picks = {
            let mut rng = rand::rng();
            pick_diversity(&config.pool, &used_styles, &mut rng)
        };

        let ctx = assemble(
            config,
            &self.schedules,
            &self.weeks,
            &self.collab,
            date,
            request.conversation_key,
            picks,
        )
        .await;

        let prompt = build_day_prompt(&config.prompt_template, &ctx, request.amendment);
        let invoker = ModelInvoker::new().with_timeout(config.model_timeout_secs);
        let mut output = invoker.invoke(&self.collab, model.as_ref(), &prompt).await?;

        let mut attempts = 1;
        loop {
            match validate(extract_object(&output), &ctx.outfit_style) {
                Ok(payload) => {
                    return Ok(ScheduleRecord {
                        date: DateKey::from_date(date),
                        outfit: payload.outfit,
                        schedule: payload.schedule,
                        status: ScheduleStatus::Ok,
                        outfit_style: payload.outfit_style,
                        weather: ctx.weather,
                    });
                }
                Err(failure) if attempts > MAX_REPAIR_ATTEMPTS => {
                    return Err(GenerationError::Validation {
                        attempts,
                        reason: failure.to_string(),
                    });
                }
                Err(failure) => {
                    log::warn!("Attempt {} for {} rejected: {}", attempts, date, failure);
                    let repair = build_repair_prompt(&failure, &ctx.outfit_style, &output);
                    output = invoker.invoke(&self.collab, model.as_ref(), &repair).await?;
                    attempts += 1;
                }
            }
        }
    }

    /// Build and persist the plan for the ISO week containing `date`.
    ///
    /// Falls back to a template-only plan when the model is unavailable or its
    /// output is unusable.
    pub async fn generate_week(
        &self,
        config: &Config,
        date: NaiveDate,
    ) -> Result<WeekPlan, GenerationError> {
        let _slot = self
            .slot
            .try_lock()
            .map_err(|_| GenerationError::AlreadyInProgress)?;

        let week = WeekKey::from_date(date);
        log::info!("Planning week {} ({})", week, config.week_template.as_str());

        let plan = match self.run_week_pipeline(config, &week).await {
            Ok(plan) => plan,
            Err(e) => {
                log::warn!("Week plan for {} falls back to template: {}", week, e);
                WeekPlan::from_template(week.clone(), config.week_template)
            }
        };

        if let Err(e) = self.weeks.set(plan.clone()) {
            log::error!("Failed to persist week plan {}: {}", week, e);
        }

        Ok(plan)
    }

    /// The stored plan for the week containing `date`, planning it first when absent.
    pub async fn ensure_week(
        &self,
        config: &Config,
        date: NaiveDate,
    ) -> Result<WeekPlan, GenerationError> {
        if let Some(plan) = self.weeks.get(WeekKey::from_date(date)) {
            return Ok(plan);
        }
        self.generate_week(config, date).await
    }

    async fn run_week_pipeline(
        &self,
        config: &Config,
        week: &WeekKey,
    ) -> Result<WeekPlan, GenerationError> {
        let model = resolve_model(self.collab.providers.as_ref(), config.provider_id.as_deref())?;
        let persona = persona_desc(&self.collab).await;
        let prompt = build_week_prompt(week, config.week_template, &persona);

        let invoker = ModelInvoker::new().with_timeout(config.model_timeout_secs);
        let output = invoker.invoke(&self.collab, model.as_ref(), &prompt).await?;

        let obj = extract_object(&output).map_err(|e| GenerationError::Validation {
            attempts: 1,
            reason: e.to_string(),
        })?;
        WeekPlan::from_model_output(week.clone(), config.week_template, &obj).ok_or_else(|| {
            GenerationError::Validation {
                attempts: 1,
                reason: "week plan has no theme".to_string(),
            }
        })
    }
}
