use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::collaborators::Collaborators;
use crate::generator::Generator;
use crate::providers::{CalendarHolidays, MemoryConversations, StaticPersona, StaticProviders};
use crate::store::{ScheduleStore, WeekStore};
use crate::types::{Config, JobId};
use crate::util::{atomic_write_str, file_stamp, FileStamp};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "LIFEDAY_CONFIG";

pub const SCHEDULE_FILE: &str = "schedule_data.json";
pub const WEEK_FILE: &str = "week_plans.json";

/// Process-wide state shared by the scheduler, executor and commands.
pub struct AppState {
    pub config: RwLock<Config>,
    config_path: PathBuf,
    /// Stamp of the config file as last loaded or written by this process.
    config_stamp: Mutex<Option<FileStamp>>,
    pub generator: Generator,
    pub last_scheduled_run: Mutex<HashMap<JobId, DateTime<Utc>>>,
    /// Woken when the daily time changes so the scheduler re-reads config at once.
    pub reschedule: Notify,
}

impl AppState {
    pub fn new(config_path: PathBuf, config: Config, collab: Collaborators) -> Self {
        let dir = data_dir(&config, &config_path);
        let generator = Generator::new(
            ScheduleStore::open(dir.join(SCHEDULE_FILE)),
            WeekStore::open(dir.join(WEEK_FILE)),
            collab,
        );

        Self {
            config: RwLock::new(config),
            config_stamp: Mutex::new(file_stamp(&config_path)),
            config_path,
            generator,
            last_scheduled_run: Mutex::new(HashMap::new()),
            reschedule: Notify::new(),
        }
    }

    /// Load config from disk and wire the built-in collaborators.
    pub fn load() -> Result<Self, String> {
        let path = config_path()?;
        let config = load_config(&path)?;
        let collab = default_collaborators(&config);
        Ok(Self::new(path, config, collab))
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        self.config
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Reload config when another process rewrote the file since we last saw it.
    ///
    /// Returns `true` when a new config was swapped in. An unreadable file is
    /// logged and the current config stays.
    pub fn reload_config_if_changed(&self) -> bool {
        let current = file_stamp(&self.config_path);
        let Ok(mut seen) = self.config_stamp.lock() else {
            return false;
        };
        if current.is_none() || current == *seen {
            return false;
        }
        *seen = current;

        match load_config(&self.config_path) {
            Ok(config) => {
                let Ok(mut guard) = self.config.write() else {
                    return false;
                };
                *guard = config;
                log::info!("Config changed on disk, reloaded {}", self.config_path.display());
                true
            }
            Err(e) => {
                log::warn!("Ignoring config change: {}", e);
                false
            }
        }
    }

    /// Record when a scheduled run last occurred
    pub fn set_last_scheduled_run(&self, job: JobId, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_scheduled_run.lock() {
            guard.insert(job, time);
        }
    }

    /// Get when a job last ran on schedule
    pub fn get_last_scheduled_run(&self, job: JobId) -> Option<DateTime<Utc>> {
        self.last_scheduled_run
            .lock()
            .ok()
            .and_then(|guard| guard.get(&job).cloned())
    }
}

/// Collaborators backed by config tables and an OpenAI-compatible endpoint.
pub fn default_collaborators(config: &Config) -> Collaborators {
    Collaborators {
        providers: Arc::new(StaticProviders::from_configs(&config.providers)),
        conversations: Arc::new(MemoryConversations::new()),
        persona: Arc::new(StaticPersona(config.persona.clone())),
        holidays: Arc::new(CalendarHolidays::new(config.holidays.clone())),
        weather: None,
    }
}

/// Get the config file path ($LIFEDAY_CONFIG, else ~/.lifeday/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".lifeday").join("config.json"))
}

/// Directory holding the data files: `data_dir` from config, else the config's directory.
pub fn data_dir(config: &Config, config_path: &Path) -> PathBuf {
    match config.data_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => expand_home(dir),
        _ => config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Load configuration. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `mutator` to the in-memory config and write it atomically.
///
/// The in-memory config only changes once the file write succeeded.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    // Same lock order as reload_config_if_changed: stamp, then config.
    let mut seen = state.config_stamp.lock().map_err(|_| "Lock poisoned")?;
    let mut guard = state.config.write().map_err(|_| "Lock poisoned")?;

    let mut config = guard.clone();
    mutator(&mut config);

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    atomic_write_str(&state.config_path, &content)
        .map_err(|e| format!("Failed to write config: {}", e))?;

    *guard = config.clone();
    *seen = file_stamp(&state.config_path);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{test_state, ScriptedModel};

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.schedule_time, "07:00");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_config(&path).unwrap_err().starts_with("Failed to parse config"));
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            Config::default(),
            Arc::new(ScriptedModel::texts("m", &[])),
        );

        let updated = create_or_update_config(&state, |c| c.schedule_time = "08:30".to_string())
            .unwrap();
        assert_eq!(updated.schedule_time, "08:30");
        assert_eq!(state.config().schedule_time, "08:30");
        assert_eq!(load_config(state.config_path()).unwrap().schedule_time, "08:30");
    }

    #[test]
    fn test_config_written_by_another_state_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = test_state(
            dir.path(),
            Config::default(),
            Arc::new(ScriptedModel::texts("m", &[])),
        );
        let command = test_state(
            dir.path(),
            Config::default(),
            Arc::new(ScriptedModel::texts("m", &[])),
        );

        create_or_update_config(&command, |c| c.schedule_time = "21:45".to_string()).unwrap();
        assert_eq!(daemon.config().schedule_time, "07:00");

        assert!(daemon.reload_config_if_changed());
        assert_eq!(daemon.config().schedule_time, "21:45");
        assert!(!daemon.reload_config_if_changed());
        // The writer already holds what it wrote.
        assert!(!command.reload_config_if_changed());
    }

    #[test]
    fn test_unreadable_config_change_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            Config::default(),
            Arc::new(ScriptedModel::texts("m", &[])),
        );
        fs::write(state.config_path(), "{ half written").unwrap();

        assert!(!state.reload_config_if_changed());
        assert_eq!(state.config().schedule_time, "07:00");
    }

    #[test]
    fn test_data_dir_defaults_next_to_config() {
        let config = Config::default();
        assert_eq!(
            data_dir(&config, Path::new("/tmp/lifeday/config.json")),
            PathBuf::from("/tmp/lifeday")
        );
        let config = Config {
            data_dir: Some("/srv/lifeday".to_string()),
            ..Config::default()
        };
        assert_eq!(
            data_dir(&config, Path::new("/tmp/lifeday/config.json")),
            PathBuf::from("/srv/lifeday")
        );
    }

    #[test]
    fn test_data_files_land_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            Config::default(),
            Arc::new(ScriptedModel::texts("m", &[])),
        );
        assert_eq!(
            state.generator.schedules().path(),
            dir.path().join(SCHEDULE_FILE)
        );
        assert_eq!(state.generator.weeks().path(), dir.path().join(WEEK_FILE));
    }

    #[test]
    fn test_last_scheduled_run_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            Config::default(),
            Arc::new(ScriptedModel::texts("m", &[])),
        );
        assert!(state.get_last_scheduled_run(JobId::Daily).is_none());
        let now = Utc::now();
        state.set_last_scheduled_run(JobId::Daily, now);
        assert_eq!(state.get_last_scheduled_run(JobId::Daily), Some(now));
    }
}
