//! Context assembly for day generation.
//!
//! Gathers weekday, holiday, weather, persona, history, recent dialogue, week
//! plan and diversity picks into one bounded `GenerationContext`. Collaborator
//! failures never escape: each source falls back to a fixed sentinel.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use rand::seq::IndexedRandom;

use crate::collaborators::{Collaborators, DialogueRole};
use crate::date_key::DateKey;
use crate::store::{ScheduleStore, WeekStore};
use crate::types::{Config, DiversityPool, ScheduleRecord};
use crate::util::truncate_chars;
use crate::validate::strip_style_marker;
use crate::week::{weekday_name, WeekKey};

pub const NO_HISTORY: &str = "(no history)";
pub const NO_RECENT_CHAT: &str = "No recent conversation";
pub const RECENT_CHAT_FAILED: &str = "Failed to fetch recent conversation";
pub const DEFAULT_PERSONA: &str =
    "You are an AI companion who loves everyday life and notices small feelings.";

const HISTORY_OUTFIT_CHARS: usize = 40;
const HISTORY_SCHEDULE_CHARS: usize = 60;
const DIALOGUE_TURN_CHARS: usize = 200;

/// Everything the prompt template can reference. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationContext {
    pub date_str: String,
    pub weekday: String,
    pub holiday: String,
    pub weather: String,
    pub persona_desc: String,
    pub history_schedules: String,
    pub recent_chats: String,
    pub daily_theme: String,
    pub mood_color: String,
    pub outfit_style: String,
    pub schedule_type: String,
    pub week_theme: String,
    pub week_hint: String,
}

impl GenerationContext {
    /// Look up a template placeholder by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "date_str" => &self.date_str,
            "weekday" => &self.weekday,
            "holiday" => &self.holiday,
            "weather" => &self.weather,
            "persona_desc" => &self.persona_desc,
            "history_schedules" => &self.history_schedules,
            "recent_chats" => &self.recent_chats,
            "daily_theme" => &self.daily_theme,
            "mood_color" => &self.mood_color,
            "outfit_style" => &self.outfit_style,
            "schedule_type" => &self.schedule_type,
            "week_theme" => &self.week_theme,
            "week_hint" => &self.week_hint,
            _ => return None,
        };
        Some(value.as_str())
    }
}

/// Per-invocation random flavor attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiversityPicks {
    pub daily_theme: String,
    pub mood_color: String,
    pub outfit_style: String,
    pub schedule_type: String,
}

// =============================================================================
// History + style rotation
// =============================================================================

fn previous_days(date: NaiveDate, days: u32) -> impl Iterator<Item = NaiveDate> {
    (1..=i64::from(days)).filter_map(move |i| date.checked_sub_signed(Duration::days(i)))
}

/// Style of a stored record: the explicit field, else parsed from the outfit's first line.
///
/// When the marker is followed by a pool entry, the longest matching entry wins.
pub fn record_style(record: &ScheduleRecord, pool_styles: &[String]) -> Option<String> {
    let explicit = record.outfit_style.trim();
    if !explicit.is_empty() {
        return Some(explicit.to_string());
    }
    let first_line = record.outfit.trim_start().lines().next()?;
    let rest = strip_style_marker(first_line)?;
    if rest.is_empty() {
        return None;
    }
    pool_styles
        .iter()
        .filter(|s| !s.is_empty() && rest.starts_with(s.as_str()))
        .max_by_key(|s| s.len())
        .cloned()
        .or_else(|| Some(rest.to_string()))
}

/// One line per usable day in the previous `days` days, newest first.
pub fn history_summary(
    store: &ScheduleStore,
    date: NaiveDate,
    days: u32,
    pool_styles: &[String],
) -> String {
    let mut lines = Vec::new();
    for day in previous_days(date, days) {
        let Some(record) = store.get(DateKey::from_date(day)) else {
            continue;
        };
        if !record.is_ok() {
            continue;
        }
        let mut line = format!(
            "[{}] outfit: {} schedule: {}",
            record.date,
            truncate_chars(&record.outfit, HISTORY_OUTFIT_CHARS),
            truncate_chars(&record.schedule, HISTORY_SCHEDULE_CHARS),
        );
        if let Some(style) = record_style(&record, pool_styles) {
            line.push_str(&format!(" style: {}", style));
        }
        lines.push(line);
    }

    if lines.is_empty() {
        NO_HISTORY.to_string()
    } else {
        lines.join("\n")
    }
}

/// Styles used in the previous `days` days (successful records only).
pub fn recent_styles(
    store: &ScheduleStore,
    date: NaiveDate,
    days: u32,
    pool_styles: &[String],
) -> HashSet<String> {
    previous_days(date, days)
        .filter_map(|day| store.get(DateKey::from_date(day)))
        .filter(ScheduleRecord::is_ok)
        .filter_map(|record| record_style(&record, pool_styles))
        .collect()
}

/// Uniform pick among styles not in `used`; the whole pool when every style was used.
pub fn pick_style<R: rand::Rng + ?Sized>(
    styles: &[String],
    used: &HashSet<String>,
    rng: &mut R,
) -> String {
    let fresh: Vec<&String> = styles.iter().filter(|s| !used.contains(*s)).collect();
    let picked = if fresh.is_empty() || styles.len() <= 1 {
        styles.choose(rng)
    } else {
        fresh.choose(rng).copied()
    };
    picked.cloned().unwrap_or_default()
}

/// Draw the four flavor attributes for one invocation.
pub fn pick_diversity<R: rand::Rng + ?Sized>(
    pool: &DiversityPool,
    used_styles: &HashSet<String>,
    rng: &mut R,
) -> DiversityPicks {
    DiversityPicks {
        daily_theme: pool.daily_themes.choose(rng).cloned().unwrap_or_default(),
        mood_color: pool.mood_colors.choose(rng).cloned().unwrap_or_default(),
        outfit_style: pick_style(&pool.outfit_styles, used_styles, rng),
        schedule_type: pool.schedule_types.choose(rng).cloned().unwrap_or_default(),
    }
}

// =============================================================================
// Collaborator-backed signals
// =============================================================================

/// Last `count` turns of a conversation, one tagged line per turn.
pub async fn recent_chats(
    collab: &Collaborators,
    conversation_key: Option<&str>,
    count: usize,
) -> String {
    let Some(key) = conversation_key.filter(|k| !k.is_empty()) else {
        return NO_RECENT_CHAT.to_string();
    };
    if count == 0 {
        return NO_RECENT_CHAT.to_string();
    }

    match collab.conversations.recent_dialogue(key, count).await {
        Ok(turns) => {
            let lines: Vec<String> = turns
                .iter()
                .filter_map(|turn| {
                    let tag = match turn.role {
                        DialogueRole::User => "User",
                        DialogueRole::Assistant => "Assistant",
                        DialogueRole::Other => return None,
                    };
                    Some(format!(
                        "{}: {}",
                        tag,
                        truncate_chars(turn.content.trim(), DIALOGUE_TURN_CHARS)
                    ))
                })
                .collect();
            if lines.is_empty() {
                NO_RECENT_CHAT.to_string()
            } else {
                lines.join("\n")
            }
        }
        Err(e) => {
            log::error!("Failed to get recent chats for {}: {}", key, e);
            RECENT_CHAT_FAILED.to_string()
        }
    }
}

pub async fn persona_desc(collab: &Collaborators) -> String {
    match collab.persona.persona().await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => DEFAULT_PERSONA.to_string(),
        Err(e) => {
            log::warn!("Persona lookup failed, using default: {}", e);
            DEFAULT_PERSONA.to_string()
        }
    }
}

pub async fn holiday_note(collab: &Collaborators, date: NaiveDate) -> String {
    match collab.holidays.holiday(date).await {
        Ok(Some(name)) if !name.trim().is_empty() => format!("Today is {}.", name.trim()),
        Ok(_) => String::new(),
        Err(e) => {
            log::debug!("Holiday lookup failed for {}: {}", date, e);
            String::new()
        }
    }
}

pub async fn weather_note(collab: &Collaborators, date: NaiveDate) -> String {
    let Some(source) = &collab.weather else {
        return String::new();
    };
    match source.weather(date).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            log::debug!("Weather lookup failed for {}: {}", date, e);
            String::new()
        }
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Build the full context for `date`. `picks` are drawn beforehand so no RNG is
/// held across collaborator calls.
pub async fn assemble(
    config: &Config,
    schedules: &ScheduleStore,
    weeks: &WeekStore,
    collab: &Collaborators,
    date: NaiveDate,
    conversation_key: Option<&str>,
    picks: DiversityPicks,
) -> GenerationContext {
    let history_schedules = if config.reference_history_days == 0 {
        NO_HISTORY.to_string()
    } else {
        history_summary(
            schedules,
            date,
            config.reference_history_days,
            &config.pool.outfit_styles,
        )
    };

    let (week_theme, week_hint) = match weeks.get(WeekKey::from_date(date)) {
        Some(plan) => (plan.theme.clone(), plan.hint_for(date.weekday())),
        None => (String::new(), String::new()),
    };

    let holiday = holiday_note(collab, date).await;
    let weather = weather_note(collab, date).await;
    let persona_desc = persona_desc(collab).await;
    let recent_chats = recent_chats(collab, conversation_key, config.reference_recent_count).await;

    GenerationContext {
        date_str: date.format("%B %-d, %Y").to_string(),
        weekday: weekday_name(date.weekday()).to_string(),
        holiday,
        weather,
        persona_desc,
        history_schedules,
        recent_chats,
        daily_theme: picks.daily_theme,
        mood_color: picks.mood_color,
        outfit_style: picks.outfit_style,
        schedule_type: picks.schedule_type,
        week_theme,
        week_hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::DialogueTurn;
    use crate::mock::{
        collaborators_with, CountingConversations, FixedHoliday, FixedPersona, FixedWeather,
        ScriptedModel,
    };
    use crate::types::ScheduleStatus;
    use crate::week::{WeekPlan, WeekTemplateId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn ok_record(d: u32, outfit: &str, style: &str) -> ScheduleRecord {
        ScheduleRecord {
            date: DateKey::from_date(day(d)),
            outfit: outfit.to_string(),
            schedule: "morning walk, afternoon reading, evening tea with a friend downtown".to_string(),
            status: ScheduleStatus::Ok,
            outfit_style: style.to_string(),
            weather: String::new(),
        }
    }

    fn styles(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn test_collab() -> Collaborators {
        collaborators_with(
            Arc::new(ScriptedModel::texts("m", &[])),
            Arc::new(CountingConversations::default()),
        )
    }

    #[test]
    fn test_history_skips_missing_and_failed_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::open(dir.path().join("s.json"));
        store
            .set(ok_record(15, "style: cozy - a very long knitted sweater with wide jeans and boots", ""))
            .unwrap();
        store.set(ScheduleRecord::failed(DateKey::from_date(day(14)))).unwrap();
        store.set(ok_record(12, "plain coat", "street")).unwrap();

        let summary = history_summary(&store, day(16), 3, &styles(&["cozy", "street"]));
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[2026-10-15] outfit: style: cozy - a very long knitted sweate schedule:"));
        assert!(lines[0].ends_with(" style: cozy"));
        assert!(!summary.contains("generation failed"));
    }

    #[test]
    fn test_history_sentinel_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::open(dir.path().join("s.json"));
        assert_eq!(history_summary(&store, day(16), 3, &[]), NO_HISTORY);
    }

    #[test]
    fn test_record_style_prefers_longest_pool_match() {
        let pool = styles(&["street", "street chic"]);
        let record = ok_record(1, "[style: street chic] denim jacket", "");
        assert_eq!(record_style(&record, &pool).as_deref(), Some("street chic"));
        let record = ok_record(1, "style: vintage - skirt", "");
        assert_eq!(record_style(&record, &pool).as_deref(), Some("vintage - skirt"));
        let record = ok_record(1, "style: street", "elegant");
        assert_eq!(record_style(&record, &pool).as_deref(), Some("elegant"));
        let record = ok_record(1, "just a coat", "");
        assert_eq!(record_style(&record, &pool), None);
    }

    #[test]
    fn test_anti_repetition_draws_only_unused_uniformly() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::open(dir.path().join("s.json"));
        let pool = styles(&["A", "B", "C"]);
        for d in 13..=15 {
            store.set(ok_record(d, "style: A - outfit", "")).unwrap();
        }

        let used = recent_styles(&store, day(16), 3, &pool);
        assert_eq!(used, HashSet::from(["A".to_string()]));

        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..2_000 {
            *counts.entry(pick_style(&pool, &used, &mut rng)).or_default() += 1;
        }
        assert!(!counts.contains_key("A"));
        let b = counts["B"] as f64;
        let c = counts["C"] as f64;
        assert!((b / (b + c) - 0.5).abs() < 0.05, "B={} C={}", b, c);
    }

    #[test]
    fn test_all_styles_used_falls_back_to_full_pool() {
        let pool = styles(&["A", "B"]);
        let used = HashSet::from(["A".to_string(), "B".to_string()]);
        let mut rng = StdRng::seed_from_u64(1);
        let picks: HashSet<String> = (0..200).map(|_| pick_style(&pool, &used, &mut rng)).collect();
        assert_eq!(picks.len(), 2);

        let single = styles(&["only"]);
        let used = HashSet::from(["only".to_string()]);
        assert_eq!(pick_style(&single, &used, &mut rng), "only");
        assert_eq!(pick_style(&[], &HashSet::new(), &mut rng), "");
    }

    #[tokio::test]
    async fn test_recent_chats_formatting_and_sentinels() {
        let conversations = Arc::new(CountingConversations::default());
        conversations
            .inner
            .push("chat-1", DialogueTurn::new(DialogueRole::User, "hello"));
        conversations
            .inner
            .push("chat-1", DialogueTurn::new(DialogueRole::Other, "system note"));
        conversations
            .inner
            .push("chat-1", DialogueTurn::new(DialogueRole::Assistant, "hi there"));
        let collab = collaborators_with(Arc::new(ScriptedModel::texts("m", &[])), conversations);

        assert_eq!(
            recent_chats(&collab, Some("chat-1"), 10).await,
            "User: hello\nAssistant: hi there"
        );
        assert_eq!(recent_chats(&collab, None, 10).await, NO_RECENT_CHAT);
        assert_eq!(recent_chats(&collab, Some("chat-1"), 0).await, NO_RECENT_CHAT);
        assert_eq!(recent_chats(&collab, Some("nobody"), 10).await, NO_RECENT_CHAT);

        let failing = Arc::new(CountingConversations {
            fail_reads: true,
            ..Default::default()
        });
        let collab = collaborators_with(Arc::new(ScriptedModel::texts("m", &[])), failing);
        assert_eq!(recent_chats(&collab, Some("chat-1"), 10).await, RECENT_CHAT_FAILED);
    }

    #[tokio::test]
    async fn test_collaborator_failures_fall_back() {
        let mut collab = test_collab();
        collab.persona = Arc::new(FixedPersona(Err("persona service down".to_string())));
        collab.holidays = Arc::new(FixedHoliday(Err("lookup failed".to_string())));
        collab.weather = Some(Arc::new(FixedWeather(Err("no network".to_string()))));

        assert_eq!(persona_desc(&collab).await, DEFAULT_PERSONA);
        assert_eq!(holiday_note(&collab, day(1)).await, "");
        assert_eq!(weather_note(&collab, day(1)).await, "");

        collab.holidays = Arc::new(FixedHoliday(Ok(Some("National Day".to_string()))));
        assert_eq!(holiday_note(&collab, day(1)).await, "Today is National Day.");
    }

    #[tokio::test]
    async fn test_assemble_fills_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let schedules = ScheduleStore::open(dir.path().join("s.json"));
        let weeks = WeekStore::open(dir.path().join("w.json"));
        weeks
            .set(WeekPlan::from_template(WeekKey::from_date(day(16)), WeekTemplateId::Relaxed))
            .unwrap();
        let mut collab = test_collab();
        collab.weather = Some(Arc::new(FixedWeather(Ok("light rain, 14°C".to_string()))));

        let picks = DiversityPicks {
            daily_theme: "slow morning".to_string(),
            mood_color: "soft blue".to_string(),
            outfit_style: "cozy".to_string(),
            schedule_type: "relaxed".to_string(),
        };
        let ctx = assemble(&Config::default(), &schedules, &weeks, &collab, day(16), None, picks).await;

        assert_eq!(ctx.date_str, "October 16, 2026");
        assert_eq!(ctx.weekday, "Friday");
        assert_eq!(ctx.weather, "light rain, 14°C");
        assert_eq!(ctx.history_schedules, NO_HISTORY);
        assert_eq!(ctx.recent_chats, NO_RECENT_CHAT);
        assert_eq!(ctx.outfit_style, "cozy");
        assert_eq!(ctx.week_theme, "a slow, relaxed week");
        assert_eq!(ctx.week_hint, "treat yourself");
        assert_eq!(ctx.field("persona_desc"), Some("A cheerful librarian who loves tea."));
        assert_eq!(ctx.field("unknown"), None);
    }
}
