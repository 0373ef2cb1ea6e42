//! Week plans: an ISO-week keyed theme, goals and per-weekday hints.
//!
//! Plans are built from a model response when possible and always normalized
//! against a built-in template, so every weekday resolves to a hint and a list
//! of activities.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::DateKeyError;

/// Monday-first weekday names, indexed by `num_days_from_monday`.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAY_NAMES[day.num_days_from_monday() as usize]
}

/// Match a weekday name case-insensitively, accepting three-letter forms.
fn canonical_weekday(name: &str) -> Option<&'static str> {
    let lower = name.trim().to_lowercase();
    WEEKDAY_NAMES
        .iter()
        .find(|full| {
            let full_lower = full.to_lowercase();
            lower == full_lower || (lower.len() == 3 && full_lower.starts_with(&lower))
        })
        .copied()
}

/// ISO week identifier, `YYYY-Www`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey(String);

impl WeekKey {
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self(format!("{}-W{:02}", iso.year(), iso.week()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WeekKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WeekKey {
    type Error = DateKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let invalid = || DateKeyError::UnsupportedType(format!("not a YYYY-Www key: {value:?}"));
        let (year, week) = value.split_once("-W").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .map(Self::from_date)
            .ok_or_else(invalid)
    }
}

impl From<WeekKey> for String {
    fn from(key: WeekKey) -> Self {
        key.0
    }
}

/// Built-in week template. Unknown ids fall back to `Balanced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WeekTemplateId {
    #[default]
    Balanced,
    Productive,
    Relaxed,
}

impl WeekTemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekTemplateId::Balanced => "balanced",
            WeekTemplateId::Productive => "productive",
            WeekTemplateId::Relaxed => "relaxed",
        }
    }

    pub fn template(&self) -> &'static WeekTemplate {
        match self {
            WeekTemplateId::Balanced => &BALANCED,
            WeekTemplateId::Productive => &PRODUCTIVE,
            WeekTemplateId::Relaxed => &RELAXED,
        }
    }
}

impl From<String> for WeekTemplateId {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "balanced" => WeekTemplateId::Balanced,
            "productive" => WeekTemplateId::Productive,
            "relaxed" => WeekTemplateId::Relaxed,
            other => {
                log::warn!("Unknown week template '{}', using balanced", other);
                WeekTemplateId::Balanced
            }
        }
    }
}

impl From<WeekTemplateId> for String {
    fn from(id: WeekTemplateId) -> Self {
        id.as_str().to_string()
    }
}

pub struct WeekTemplate {
    pub theme: &'static str,
    pub goals: &'static [&'static str],
    /// Monday-first.
    pub hints: [&'static str; 7],
    /// Monday-first.
    pub activities: [&'static [&'static str]; 7],
}

static BALANCED: WeekTemplate = WeekTemplate {
    theme: "a steady, balanced week",
    goals: &["keep a regular sleep rhythm", "finish one small personal project"],
    hints: [
        "ease into the week",
        "focus on errands",
        "midweek reset",
        "catch up with someone",
        "wrap up loose ends",
        "something fun outdoors",
        "rest and prepare",
    ],
    activities: [
        &["plan the week", "light walk"],
        &["groceries", "tidy the room"],
        &["yoga", "read a chapter"],
        &["coffee with a friend"],
        &["finish pending tasks", "movie night"],
        &["park visit", "try a new café"],
        &["slow breakfast", "journal"],
    ],
};

static PRODUCTIVE: WeekTemplate = WeekTemplate {
    theme: "a focused, productive week",
    goals: &["make real progress on a study goal", "clear the backlog"],
    hints: [
        "set priorities",
        "deep work",
        "deep work",
        "review progress",
        "ship something",
        "light catch-up",
        "recharge",
    ],
    activities: [
        &["write a to-do list", "study session"],
        &["two focus blocks"],
        &["two focus blocks", "gym"],
        &["review notes"],
        &["finish the week's task"],
        &["errands", "short outing"],
        &["rest", "plan next week"],
    ],
};

static RELAXED: WeekTemplate = WeekTemplate {
    theme: "a slow, relaxed week",
    goals: &["rest well", "enjoy small things"],
    hints: [
        "take it slow",
        "a cozy day in",
        "short walk outside",
        "creative time",
        "treat yourself",
        "lazy weekend morning",
        "quiet evening",
    ],
    activities: [
        &["tea", "music"],
        &["baking", "reading"],
        &["walk", "photos"],
        &["drawing", "crafts"],
        &["favourite dinner"],
        &["sleep in", "brunch"],
        &["bath", "early night"],
    ],
};

/// One week's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub week: WeekKey,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub daily_hints: BTreeMap<String, String>,
    #[serde(default)]
    pub suggested_activities: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub template_id: WeekTemplateId,
    #[serde(default)]
    pub generated: bool,
}

impl WeekPlan {
    /// A plan made only of template defaults.
    pub fn from_template(week: WeekKey, template_id: WeekTemplateId) -> Self {
        Self {
            week,
            theme: String::new(),
            goals: Vec::new(),
            daily_hints: BTreeMap::new(),
            suggested_activities: BTreeMap::new(),
            template_id,
            generated: false,
        }
        .normalized()
    }

    /// Build a plan from a model's JSON object. Returns None without a theme.
    pub fn from_model_output(
        week: WeekKey,
        template_id: WeekTemplateId,
        obj: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<Self> {
        let theme = obj.get("theme")?.as_str()?.trim().to_string();
        if theme.is_empty() {
            return None;
        }

        let goals = string_list(obj.get("goals"));
        let daily_hints = obj
            .get("daily_hints")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.trim().to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let suggested_activities = obj
            .get("suggested_activities")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), string_list(Some(v))))
                    .collect()
            })
            .unwrap_or_default();

        Some(
            Self {
                week,
                theme,
                goals,
                daily_hints,
                suggested_activities,
                template_id,
                generated: true,
            }
            .normalized(),
        )
    }

    /// Canonicalize weekday keys and fill anything missing from the template.
    pub fn normalized(mut self) -> Self {
        let template = self.template_id.template();

        let mut hints = BTreeMap::new();
        for (day, hint) in std::mem::take(&mut self.daily_hints) {
            if let Some(name) = canonical_weekday(&day) {
                if !hint.trim().is_empty() {
                    hints.insert(name.to_string(), hint);
                }
            }
        }
        let mut activities = BTreeMap::new();
        for (day, list) in std::mem::take(&mut self.suggested_activities) {
            if let Some(name) = canonical_weekday(&day) {
                if !list.is_empty() {
                    activities.insert(name.to_string(), list);
                }
            }
        }

        for (idx, name) in WEEKDAY_NAMES.iter().enumerate() {
            hints
                .entry(name.to_string())
                .or_insert_with(|| template.hints[idx].to_string());
            activities.entry(name.to_string()).or_insert_with(|| {
                template.activities[idx].iter().map(|s| s.to_string()).collect()
            });
        }

        if self.theme.trim().is_empty() {
            self.theme = template.theme.to_string();
        }
        if self.goals.is_empty() {
            self.goals = template.goals.iter().map(|s| s.to_string()).collect();
        }
        self.daily_hints = hints;
        self.suggested_activities = activities;
        self
    }

    pub fn hint_for(&self, day: Weekday) -> String {
        let idx = day.num_days_from_monday() as usize;
        self.daily_hints
            .get(WEEKDAY_NAMES[idx])
            .cloned()
            .unwrap_or_else(|| self.template_id.template().hints[idx].to_string())
    }

    pub fn activities_for(&self, day: Weekday) -> Vec<String> {
        let idx = day.num_days_from_monday() as usize;
        self.suggested_activities
            .get(WEEKDAY_NAMES[idx])
            .cloned()
            .unwrap_or_else(|| {
                self.template_id.template().activities[idx]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            })
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Prompt asking the model for a week plan as JSON.
pub fn build_week_prompt(week: &WeekKey, template_id: WeekTemplateId, persona: &str) -> String {
    let template = template_id.template();
    let mut prompt = String::with_capacity(1_024);

    prompt.push_str(persona);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "Plan the week {} for the character above. The week should feel like {}.\n\n",
        week, template.theme
    ));
    prompt.push_str("Reply with JSON only, no code fences or commentary:\n");
    prompt.push_str(
        "{\"theme\": \"...\", \"goals\": [\"...\"], \
         \"daily_hints\": {\"Monday\": \"...\", ...}, \
         \"suggested_activities\": {\"Monday\": [\"...\"], ...}}\n",
    );
    prompt.push_str(&format!(
        "Include all seven weekdays: {}.",
        WEEKDAY_NAMES.join(", ")
    ));
    prompt
}
