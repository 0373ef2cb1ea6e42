//! Inner-state block injected into a user's chat request.

use chrono::{DateTime, Timelike, Utc};

use crate::commands::local_time;
use crate::error::GenerationError;
use crate::invoke::is_synthetic_session;
use crate::state::AppState;
use crate::types::ScheduleStatus;
use crate::util::time_desc;

/// Block describing the persona's current day, or `None` when nothing should be injected.
///
/// Skips synthetic generation sessions, a generation already in flight, and
/// days whose generation failed.
pub async fn inner_state_block(
    state: &AppState,
    session_id: &str,
    conversation_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<String>, String> {
    if is_synthetic_session(session_id) {
        return Ok(None);
    }

    let config = state.config();
    let local = local_time(&config, now)?;
    let date = local.date_naive();

    let record = match state
        .generator
        .get_or_generate(&config, date, conversation_key)
        .await
    {
        Ok(record) => record,
        Err(GenerationError::AlreadyInProgress) => {
            log::debug!("Generation in progress, skipping injection for {}", session_id);
            return Ok(None);
        }
        Err(e) => return Err(e.to_string()),
    };

    if record.status == ScheduleStatus::Failed {
        log::debug!("Record for {} failed, skipping injection", record.date);
        return Ok(None);
    }

    Ok(Some(format!(
        "[Your current state]\nIt is {}.\nToday's outfit: {}\nToday's schedule: {}",
        time_desc(local.hour()),
        record.outfit,
        record.schedule
    )))
}
