use crate::application::bootstrap::bootstrap_workspace;
use crate::application::pomodoro_timer::{Authority, PomodoroTimer, TimerOptions, TimerOutcome};
use crate::application::settings_store::SettingsStore;
use crate::domain::models::{DurationConfig, TimerState};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::AuthorityMode;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{KeyValueStore, SqliteKeyValueStore};
use crate::infrastructure::notifier::{LogNotifier, PhaseNotifier};
use crate::infrastructure::session_api::ReqwestSessionApi;
use crate::infrastructure::settings_api::{KeyValueSettingsApi, ReqwestSettingsApi, SettingsApi};
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    timezone: Tz,
    timer: PomodoroTimer,
    command_log: CommandLog,
}

impl AppState {
    pub async fn initialize(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::initialize_with_notifier(workspace_root, Arc::new(LogNotifier)).await
    }

    pub async fn initialize_with_notifier(
        workspace_root: PathBuf,
        notifier: Arc<dyn PhaseNotifier>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let timezone = bootstrap.config.timezone;
        let runtime = bootstrap.config.timer.clone();

        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        let (authority, settings_api) = match runtime.authority {
            AuthorityMode::Local => {
                let settings_api: Arc<dyn SettingsApi> =
                    Arc::new(KeyValueSettingsApi::new(Arc::clone(&store)));
                (Authority::Local, settings_api)
            }
            AuthorityMode::Remote => {
                let base_url = runtime.session_api_base_url.as_deref().ok_or_else(|| {
                    InfraError::InvalidConfig(
                        "sessionApiBaseUrl is required for remote authority".to_string(),
                    )
                })?;
                let settings_api: Arc<dyn SettingsApi> = Arc::new(ReqwestSettingsApi::new(base_url)?);
                (
                    Authority::Remote(Arc::new(ReqwestSessionApi::new(base_url)?)),
                    settings_api,
                )
            }
        };

        let options = TimerOptions::default()
            .with_timezone(timezone)
            .with_tick_interval(runtime.tick_interval)
            .with_resync_delay(runtime.resync_delay);
        let timer = PomodoroTimer::open(
            Arc::new(SettingsStore::new(settings_api)),
            store,
            notifier,
            authority,
            options,
        )
        .await?;

        let command_log = CommandLog::new(&bootstrap.logs_dir);
        command_log.info(
            "initialize",
            &format!(
                "workspace={} authority={:?} timezone={}",
                bootstrap.workspace_root.display(),
                runtime.authority,
                timezone
            ),
        );

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            timezone,
            timer,
            command_log,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn timer(&self) -> &PomodoroTimer {
        &self.timer
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.command_log.info(command, message);
    }

    pub fn log_warn(&self, command: &str, message: &str) {
        self.command_log.warn(command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.command_log.error(command, message);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerStateResponse {
    pub phase: String,
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub completed_focus_count: u32,
    pub sessions_until_long_break: u32,
    pub daily_streak: u32,
    pub weekly_progress: u32,
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettingsResponse {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
    pub auto_start_next_phase: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub focus_minutes: Option<u32>,
    pub short_break_minutes: Option<u32>,
    pub long_break_minutes: Option<u32>,
    pub long_break_interval: Option<u32>,
    pub auto_start_next_phase: Option<bool>,
}

impl SettingsPatch {
    fn apply_to(&self, current: DurationConfig) -> DurationConfig {
        DurationConfig {
            focus_minutes: self.focus_minutes.unwrap_or(current.focus_minutes),
            short_break_minutes: self.short_break_minutes.unwrap_or(current.short_break_minutes),
            long_break_minutes: self.long_break_minutes.unwrap_or(current.long_break_minutes),
            long_break_interval: self.long_break_interval.unwrap_or(current.long_break_interval),
            auto_start_next_phase: self
                .auto_start_next_phase
                .unwrap_or(current.auto_start_next_phase),
        }
    }
}

pub async fn start_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "start_timer", state.timer.start().await)
}

pub async fn pause_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "pause_timer", state.timer.pause().await)
}

pub async fn resume_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "resume_timer", state.timer.resume().await)
}

pub async fn stop_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "stop_timer", state.timer.stop().await)
}

pub async fn skip_phase_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "skip_phase", state.timer.skip().await)
}

pub async fn reset_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "reset_timer", state.timer.reset().await)
}

pub async fn refresh_session_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    finish_timer_command(state, "refresh_session", state.timer.refresh().await)
}

pub async fn get_timer_state_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.snapshot().await;
    Ok(to_timer_state_response(state, &snapshot, None))
}

pub fn get_settings_impl(state: &AppState) -> Result<SettingsResponse, InfraError> {
    Ok(to_settings_response(&state.timer.settings()?))
}

pub async fn update_settings_impl(
    state: &AppState,
    patch: SettingsPatch,
) -> Result<SettingsResponse, InfraError> {
    let requested = patch.apply_to(state.timer.settings()?);
    let outcome = match state.timer.update_settings(requested).await {
        Ok(outcome) => outcome,
        Err(error) => {
            state.log_error("update_settings", &error.to_string());
            return Err(error);
        }
    };
    if let Some(warning) = outcome.warning.as_deref() {
        state.log_warn("update_settings", warning);
    }

    let stored = state.timer.settings()?;
    state.log_info(
        "update_settings",
        &format!(
            "focus={} short_break={} long_break={} interval={} auto_start={}",
            stored.focus_minutes,
            stored.short_break_minutes,
            stored.long_break_minutes,
            stored.long_break_interval,
            stored.auto_start_next_phase
        ),
    );
    Ok(to_settings_response(&stored))
}

pub async fn shutdown_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let saved = match state.timer.shutdown().await {
        Ok(saved) => saved,
        Err(error) => {
            state.log_error("shutdown", &error.to_string());
            return Err(error);
        }
    };
    state.log_info("shutdown", &format!("saved at {}s remaining", saved.remaining_seconds));
    Ok(to_timer_state_response(state, &saved, None))
}

fn finish_timer_command(
    state: &AppState,
    command: &str,
    result: Result<TimerOutcome, InfraError>,
) -> Result<TimerStateResponse, InfraError> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => {
            state.log_error(command, &error.to_string());
            return Err(error);
        }
    };

    match outcome.warning.as_deref() {
        Some(warning) => state.log_warn(command, warning),
        None => state.log_info(
            command,
            &format!(
                "phase={} remaining={}s running={}",
                outcome.state.current_phase.as_str(),
                outcome.state.remaining_seconds,
                outcome.state.is_running
            ),
        ),
    }
    Ok(to_timer_state_response(state, &outcome.state, outcome.warning))
}

fn to_timer_state_response(
    state: &AppState,
    timer: &TimerState,
    warning: Option<String>,
) -> TimerStateResponse {
    let today = Utc::now().with_timezone(&state.timezone).date_naive();
    TimerStateResponse {
        phase: timer.current_phase.as_str().to_string(),
        remaining_seconds: timer.remaining_seconds,
        is_running: timer.is_running,
        completed_focus_count: timer.completed_focus_count,
        sessions_until_long_break: timer.sessions_until_long_break,
        daily_streak: timer.effective_daily_streak(today),
        weekly_progress: timer.effective_weekly_progress(today),
        session_id: timer.session_id.clone(),
        warning,
    }
}

fn to_settings_response(config: &DurationConfig) -> SettingsResponse {
    SettingsResponse {
        focus_minutes: config.focus_minutes,
        short_break_minutes: config.short_break_minutes,
        long_break_minutes: config.long_break_minutes,
        long_break_interval: config.long_break_interval,
        auto_start_next_phase: config.auto_start_next_phase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomodoro-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        async fn app_state(&self) -> AppState {
            AppState::initialize(self.path.clone())
                .await
                .expect("initialize app state")
        }

        fn command_log(&self) -> Vec<serde_json::Value> {
            fs::read_to_string(self.path.join("logs").join("commands.log"))
                .unwrap_or_default()
                .lines()
                .map(|line| serde_json::from_str(line).expect("json log line"))
                .collect()
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn initialize_prepares_workspace_and_idle_timer() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        assert!(state.config_dir().join("timer.json").exists());
        assert!(state.database_path().exists());

        let timer = get_timer_state_impl(&state).await.expect("timer state");
        assert_eq!(timer.phase, "idle");
        assert_eq!(timer.remaining_seconds, 1500);
        assert!(!timer.is_running);
        assert_eq!(timer.daily_streak, 0);
        assert!(workspace
            .command_log()
            .iter()
            .any(|entry| entry["command"] == "initialize"));
    }

    #[tokio::test]
    async fn start_pause_stop_flow_is_logged() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let started = start_timer_impl(&state).await.expect("start");
        assert_eq!(started.phase, "focus");
        assert!(started.is_running);

        let paused = pause_timer_impl(&state).await.expect("pause");
        assert!(!paused.is_running);

        let resumed = resume_timer_impl(&state).await.expect("resume");
        assert!(resumed.is_running);

        let stopped = stop_timer_impl(&state).await.expect("stop");
        assert_eq!(stopped.phase, "idle");
        assert_eq!(stopped.remaining_seconds, 1500);

        let commands: Vec<String> = workspace
            .command_log()
            .iter()
            .filter_map(|entry| entry["command"].as_str().map(ToOwned::to_owned))
            .collect();
        for expected in ["start_timer", "pause_timer", "resume_timer", "stop_timer"] {
            assert!(commands.iter().any(|command| command == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn skip_credits_focus_and_survives_restart() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state().await;
            start_timer_impl(&state).await.expect("start");
            let skipped = skip_phase_impl(&state).await.expect("skip");
            assert_eq!(skipped.phase, "short_break");
            assert_eq!(skipped.completed_focus_count, 1);
            assert_eq!(skipped.daily_streak, 1);
            assert_eq!(skipped.weekly_progress, 1);
            assert_eq!(skipped.sessions_until_long_break, 3);
            shutdown_impl(&state).await.expect("shutdown");
        }

        let reopened = workspace.app_state().await;
        let timer = get_timer_state_impl(&reopened).await.expect("timer state");
        assert_eq!(timer.phase, "short_break");
        assert_eq!(timer.completed_focus_count, 1);
        assert!(!timer.is_running);

        let reset = reset_timer_impl(&reopened).await.expect("reset");
        assert_eq!(reset.phase, "idle");
        assert_eq!(reset.completed_focus_count, 0);
    }

    #[tokio::test]
    async fn settings_patch_is_clamped_and_persisted() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state().await;
            let updated = update_settings_impl(
                &state,
                SettingsPatch {
                    focus_minutes: Some(0),
                    long_break_interval: Some(99),
                    ..SettingsPatch::default()
                },
            )
            .await
            .expect("update settings");
            assert_eq!(updated.focus_minutes, 1);
            assert_eq!(updated.short_break_minutes, 5);
            assert_eq!(updated.long_break_interval, 12);

            let timer = get_timer_state_impl(&state).await.expect("timer state");
            assert_eq!(timer.remaining_seconds, 60);
        }

        let reopened = workspace.app_state().await;
        let settings = get_settings_impl(&reopened).expect("settings");
        assert_eq!(settings.focus_minutes, 1);
        assert_eq!(settings.long_break_interval, 12);
    }

    #[tokio::test]
    async fn local_refresh_keeps_state() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let before = get_timer_state_impl(&state).await.expect("timer state");
        let refreshed = refresh_session_impl(&state).await.expect("refresh");
        assert_eq!(refreshed, before);
    }

    #[tokio::test]
    async fn remote_authority_requires_base_url() {
        let workspace = TempWorkspace::new();
        let config_dir = workspace.path.join("config");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join("timer.json"),
            serde_json::json!({"schema": 1, "authority": "remote"}).to_string(),
        )
        .expect("write timer config");

        let result = AppState::initialize(workspace.path.clone()).await;
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn command_error_is_logged_and_returned() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let message = state.command_error(
            "refresh_session",
            &InfraError::Sync("session api error: http 502".to_string()),
        );

        assert!(message.contains("502"));
        let entries = workspace.command_log();
        let last = entries.last().expect("log entry");
        assert_eq!(last["level"], "error");
        assert_eq!(last["command"], "refresh_session");
    }
}
