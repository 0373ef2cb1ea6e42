use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::date_key::DateKey;
use crate::week::WeekTemplateId;

/// Configuration stored in ~/.lifeday/config.json
///
/// Every field has a default so a partial (or empty) file still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daily generation time, `HH:MM` in `timezone`.
    pub schedule_time: String,
    pub timezone: String,
    /// Seconds after a scheduled time during which a missed run still fires.
    pub misfire_grace_secs: i64,
    /// Preferred provider; falls back to the active one when unset or unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub providers: Vec<ProviderConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    /// Holiday names keyed by `MM-DD` (every year) or `YYYY-MM-DD`.
    pub holidays: BTreeMap<String, String>,
    /// How many previous days feed the history summary and style rotation. 0 disables.
    pub reference_history_days: u32,
    /// How many recent chat turns feed the dialogue summary. 0 disables.
    pub reference_recent_count: usize,
    pub pool: DiversityPool,
    pub prompt_template: String,
    pub week_template: WeekTemplateId,
    pub week_planning: bool,
    pub model_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule_time: "07:00".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            misfire_grace_secs: 120,
            provider_id: None,
            providers: Vec::new(),
            persona: None,
            holidays: BTreeMap::new(),
            reference_history_days: 3,
            reference_recent_count: 10,
            pool: DiversityPool::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            week_template: WeekTemplateId::default(),
            week_planning: true,
            model_timeout_secs: 300,
            data_dir: None,
        }
    }
}

/// An OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Candidate lists the context assembler draws flavor attributes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityPool {
    pub daily_themes: Vec<String>,
    pub mood_colors: Vec<String>,
    pub outfit_styles: Vec<String>,
    pub schedule_types: Vec<String>,
}

impl Default for DiversityPool {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            daily_themes: owned(&[
                "slow morning",
                "small adventure",
                "learning something new",
                "tidying up",
                "meeting a friend",
            ]),
            mood_colors: owned(&["warm amber", "soft blue", "fresh green", "quiet grey"]),
            outfit_styles: owned(&["cozy", "casual", "sporty", "elegant", "street"]),
            schedule_types: owned(&["relaxed", "busy", "balanced", "outdoor"]),
        }
    }
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
{persona_desc}

Today is {date_str} ({weekday}). {holiday}
Weather: {weather}
This week's theme: {week_theme}. Today's hint: {week_hint}

Recent days:
{history_schedules}

Recent conversation:
{recent_chats}

Plan today's outfit and schedule for the character above.
Flavor for today: theme \"{daily_theme}\", mood color \"{mood_color}\", \
outfit style \"{outfit_style}\", schedule type \"{schedule_type}\".
Avoid repeating recent days.

Reply with a JSON object: {{\"outfit_style\": \"...\", \"outfit\": \"...\", \"schedule\": \"...\"}}";

/// Whether a generation attempt produced usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    #[default]
    Ok,
    Failed,
}

/// One day's generated outfit and schedule.
///
/// Presence in the store means generation was attempted; `Failed` records are kept
/// so callers can tell "never attempted" from "attempted and failed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub date: DateKey,
    #[serde(default)]
    pub outfit: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub status: ScheduleStatus,
    #[serde(default)]
    pub outfit_style: String,
    #[serde(default)]
    pub weather: String,
}

/// Text used for both fields of a degraded record.
pub const GENERATION_FAILED: &str = "generation failed";

impl ScheduleRecord {
    /// Degraded record written when a generation attempt fails.
    pub fn failed(date: DateKey) -> Self {
        Self {
            date,
            outfit: GENERATION_FAILED.to_string(),
            schedule: GENERATION_FAILED.to_string(),
            status: ScheduleStatus::Failed,
            outfit_style: String::new(),
            weather: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ScheduleStatus::Ok
    }
}

/// Scheduled job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobId {
    Daily,
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobId::Daily => write!(f, "daily"),
        }
    }
}

/// What triggered the execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTrigger {
    Scheduled,
    Manual,
    Missed,
}
