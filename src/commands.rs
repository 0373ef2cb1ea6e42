//! Command surface: show, regenerate, set the daily time, and the week plan.
//!
//! Every command returns `Result<_, String>` with a user-facing message on error.
//! A running daemon also reads commands from stdin, so they share its state
//! and scheduler instead of starting a second process.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::executor::request_job_execution;
use crate::generator::DayRequest;
use crate::scheduler::{get_next_run_time, parse_daily_time, SchedulerMessage};
use crate::state::{create_or_update_config, AppState};
use crate::types::{Config, JobId, ScheduleRecord, ScheduleStatus};
use crate::week::{weekday_name, WeekPlan, WEEKDAY_NAMES};

pub const USAGE: &str = "\
Usage:
  show                     show today's outfit and schedule (generating if needed)
  regenerate [requirement] regenerate today, optionally with an extra requirement
  time HH:MM               set the daily generation time (00:00-23:59)
  week [regenerate]        show or rebuild this week's plan";

/// Extra actions accepted on a running daemon's stdin.
pub const DAEMON_USAGE: &str = "  now                      queue today's generation (daemon console only)";

fn timezone(config: &Config) -> Result<Tz, String> {
    config
        .timezone
        .parse()
        .map_err(|_| format!("Invalid timezone in config: {}", config.timezone))
}

/// `now` in the configured timezone.
pub fn local_time(config: &Config, now: DateTime<Utc>) -> Result<DateTime<Tz>, String> {
    Ok(now.with_timezone(&timezone(config)?))
}

/// Today's calendar date in the configured timezone.
pub fn today(config: &Config) -> Result<NaiveDate, String> {
    Ok(local_time(config, Utc::now())?.date_naive())
}

/// Today's record, generated on first request.
pub async fn show_today(state: &AppState) -> Result<ScheduleRecord, String> {
    let config = state.config();
    let date = today(&config)?;
    state
        .generator
        .get_or_generate(&config, date, None)
        .await
        .map_err(|e| e.to_string())
}

/// Replace today's record. `amendment` is appended to the prompt verbatim.
pub async fn regenerate_today(
    state: &AppState,
    amendment: Option<&str>,
) -> Result<ScheduleRecord, String> {
    let config = state.config();
    let date = today(&config)?;
    state
        .generator
        .generate_day(
            &config,
            date,
            DayRequest {
                conversation_key: None,
                amendment,
            },
        )
        .await
        .map_err(|e| e.to_string())
}

/// Validate and persist a new daily time, then wake the scheduler.
pub fn set_daily_time(state: &AppState, value: &str) -> Result<String, String> {
    let (hour, minute) = parse_daily_time(value)?;
    let normalized = format!("{:02}:{:02}", hour, minute);

    let config = create_or_update_config(state, |c| c.schedule_time = normalized.clone())?;
    state.reschedule.notify_one();
    log::info!("Daily generation time set to {}", normalized);

    let next = get_next_run_time(&config)
        .ok()
        .and_then(|t| timezone(&config).ok().map(|tz| t.with_timezone(&tz)))
        .map(|t| format!(" Next run: {}.", t.format("%Y-%m-%d %H:%M %Z")))
        .unwrap_or_default();
    Ok(format!(
        "Daily generation time set to {} ({}).{}",
        normalized, config.timezone, next
    ))
}

/// This week's plan, planned on first request.
pub async fn show_week(state: &AppState) -> Result<WeekPlan, String> {
    let config = state.config();
    let date = today(&config)?;
    state
        .generator
        .ensure_week(&config, date)
        .await
        .map_err(|e| e.to_string())
}

pub async fn regenerate_week(state: &AppState) -> Result<WeekPlan, String> {
    let config = state.config();
    let date = today(&config)?;
    state
        .generator
        .generate_week(&config, date)
        .await
        .map_err(|e| e.to_string())
}

pub fn format_record(record: &ScheduleRecord) -> String {
    if record.status == ScheduleStatus::Failed {
        return format!("{}: generation failed. Try `regenerate`.", record.date);
    }

    let weekday = weekday_name(record.date.date().weekday());
    let mut text = format!(
        "{} ({})\n\nOutfit:\n{}\n\nSchedule:\n{}",
        record.date, weekday, record.outfit, record.schedule
    );
    if !record.weather.is_empty() {
        text.push_str(&format!("\n\nWeather: {}", record.weather));
    }
    text
}

pub fn format_week(plan: &WeekPlan) -> String {
    let mut text = format!("Week {}: {}", plan.week, plan.theme);
    if !plan.generated {
        text.push_str(" (template)");
    }
    if !plan.goals.is_empty() {
        text.push_str("\n\nGoals:");
        for goal in &plan.goals {
            text.push_str(&format!("\n- {}", goal));
        }
    }
    text.push('\n');
    for name in WEEKDAY_NAMES {
        let hint = plan.daily_hints.get(name).map(String::as_str).unwrap_or("");
        let activities = plan
            .suggested_activities
            .get(name)
            .map(|list| list.join(", "))
            .unwrap_or_default();
        text.push_str(&format!("\n{}: {} [{}]", name, hint, activities));
    }
    text
}

/// Dispatch one command line (already split into words).
pub async fn handle_command(state: &AppState, args: &[String]) -> Result<String, String> {
    let Some((action, rest)) = args.split_first() else {
        return Ok(USAGE.to_string());
    };

    match action.as_str() {
        "show" => show_today(state).await.map(|r| format_record(&r)),
        "regenerate" => {
            let amendment = rest.join(" ");
            let amendment = Some(amendment.as_str()).filter(|a| !a.trim().is_empty());
            regenerate_today(state, amendment).await.map(|r| format_record(&r))
        }
        "time" => match rest {
            [value] => set_daily_time(state, value),
            _ => Err("Usage: time HH:MM".to_string()),
        },
        "week" => match rest.first().map(String::as_str) {
            None => show_week(state).await.map(|p| format_week(&p)),
            Some("regenerate") => regenerate_week(state).await.map(|p| format_week(&p)),
            Some(other) => Err(format!("Unknown week action '{}'\n\n{}", other, USAGE)),
        },
        _ => Ok(USAGE.to_string()),
    }
}

/// Handle one line typed into the daemon console.
pub async fn handle_daemon_line(
    state: &AppState,
    sender: &mpsc::Sender<SchedulerMessage>,
    line: &str,
) -> Result<String, String> {
    let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    match args.first().map(String::as_str) {
        Some("now") => {
            request_job_execution(sender, JobId::Daily)?;
            Ok("Daily generation queued.".to_string())
        }
        _ => handle_command(state, &args).await,
    }
}

/// Read commands from stdin until it closes.
pub async fn run_console(state: Arc<AppState>, sender: mpsc::Sender<SchedulerMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match handle_daemon_line(&state, &sender, &line).await {
                Ok(output) => println!("{output}"),
                Err(e) => eprintln!("{e}"),
            },
            Ok(None) => {
                log::debug!("Console input closed");
                return;
            }
            Err(e) => {
                log::warn!("Console read failed: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_key::DateKey;
    use crate::mock::{test_state, ScriptedModel};
    use crate::state::load_config;
    use crate::types::{DiversityPool, ExecutionTrigger};

    const DAY: &str = r#"{"outfit_style":"cozy","outfit":"style: cozy - scarf","schedule":"library, tea"}"#;

    fn config() -> Config {
        Config {
            pool: DiversityPool {
                outfit_styles: vec!["cozy".to_string()],
                ..DiversityPool::default()
            },
            ..Config::default()
        }
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_show_generates_once() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::texts("m", &[DAY]));
        let state = test_state(dir.path(), config(), model.clone());

        let first = handle_command(&state, &args(&["show"])).await.unwrap();
        let second = handle_command(&state, &args(&["show"])).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains("style: cozy - scarf"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_regenerate_passes_amendment() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::texts("m", &[DAY, DAY]));
        let state = test_state(dir.path(), config(), model.clone());

        handle_command(&state, &args(&["show"])).await.unwrap();
        handle_command(&state, &args(&["regenerate", "go", "swimming"]))
            .await
            .unwrap();
        let prompts = model.prompts.lock().clone();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].ends_with("go swimming"));
    }

    #[tokio::test]
    async fn test_time_command_validates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), config(), Arc::new(ScriptedModel::texts("m", &[])));

        assert!(handle_command(&state, &args(&["time", "24:00"])).await.is_err());
        assert!(handle_command(&state, &args(&["time", "7:3"])).await.is_err());
        assert!(handle_command(&state, &args(&["time"])).await.is_err());
        assert_eq!(state.config().schedule_time, "07:00");

        let message = handle_command(&state, &args(&["time", "21:45"])).await.unwrap();
        assert!(message.starts_with("Daily generation time set to 21:45"));
        assert_eq!(state.config().schedule_time, "21:45");
        assert_eq!(load_config(state.config_path()).unwrap().schedule_time, "21:45");
    }

    #[tokio::test]
    async fn test_time_command_wakes_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), config(), Arc::new(ScriptedModel::texts("m", &[])));
        set_daily_time(&state, "06:30").unwrap();
        // The stored permit completes immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), state.reschedule.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_action_returns_usage() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), config(), Arc::new(ScriptedModel::texts("m", &[])));
        assert_eq!(handle_command(&state, &args(&["dance"])).await.unwrap(), USAGE);
        assert_eq!(handle_command(&state, &[]).await.unwrap(), USAGE);
        assert!(handle_command(&state, &args(&["week", "dance"])).await.is_err());
    }

    #[tokio::test]
    async fn test_week_command_shows_all_days() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), config(), Arc::new(ScriptedModel::texts("m", &["nope"])));
        let text = handle_command(&state, &args(&["week"])).await.unwrap();
        assert!(text.contains("(template)"));
        for name in WEEKDAY_NAMES {
            assert!(text.contains(&format!("\n{}: ", name)));
        }
    }

    #[tokio::test]
    async fn test_daemon_now_queues_manual_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), config(), Arc::new(ScriptedModel::texts("m", &[])));
        let (tx, mut rx) = mpsc::channel(4);

        let reply = handle_daemon_line(&state, &tx, "now").await.unwrap();
        assert_eq!(reply, "Daily generation queued.");
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.job, JobId::Daily);
        assert_eq!(msg.trigger, ExecutionTrigger::Manual);
    }

    #[tokio::test]
    async fn test_daemon_console_shares_state() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::texts("m", &[DAY]));
        let state = test_state(dir.path(), config(), model.clone());
        let (tx, _rx) = mpsc::channel(4);

        handle_daemon_line(&state, &tx, "  time   06:15 ").await.unwrap();
        assert_eq!(state.config().schedule_time, "06:15");

        let shown = handle_daemon_line(&state, &tx, "show").await.unwrap();
        assert!(shown.contains("library, tea"));
        assert_eq!(state.generator.schedules().len(), 1);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_daemon_now_reports_full_queue() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), config(), Arc::new(ScriptedModel::texts("m", &[])));
        let (tx, _rx) = mpsc::channel(1);

        handle_daemon_line(&state, &tx, "now").await.unwrap();
        let err = handle_daemon_line(&state, &tx, "now").await.unwrap_err();
        assert!(err.starts_with("Failed to queue job"));
    }

    #[test]
    fn test_failed_record_formatting() {
        let record = ScheduleRecord::failed(DateKey::from_date(
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
        ));
        assert_eq!(
            format_record(&record),
            "2026-10-16: generation failed. Try `regenerate`."
        );
    }
}
