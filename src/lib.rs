pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    get_settings_impl, get_timer_state_impl, pause_timer_impl, refresh_session_impl,
    reset_timer_impl, resume_timer_impl, shutdown_impl, skip_phase_impl, start_timer_impl,
    stop_timer_impl, update_settings_impl,
};
use serde::Serialize;
use std::path::PathBuf;

pub use application::commands::{AppState, SettingsPatch, SettingsResponse, TimerStateResponse};
pub use application::pomodoro_timer::{Authority, PomodoroTimer, TimerOptions, TimerOutcome};
pub use domain::models::{DurationConfig, PomodoroPhase, Session, TimerState};
pub use infrastructure::error::InfraError;

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub database_path: String,
}

pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

pub async fn start_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    start_timer_impl(state)
        .await
        .map_err(|error| state.command_error("start_timer", &error))
}

pub async fn pause_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    pause_timer_impl(state)
        .await
        .map_err(|error| state.command_error("pause_timer", &error))
}

pub async fn resume_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    resume_timer_impl(state)
        .await
        .map_err(|error| state.command_error("resume_timer", &error))
}

pub async fn stop_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    stop_timer_impl(state)
        .await
        .map_err(|error| state.command_error("stop_timer", &error))
}

pub async fn skip_phase(state: &AppState) -> Result<TimerStateResponse, String> {
    skip_phase_impl(state)
        .await
        .map_err(|error| state.command_error("skip_phase", &error))
}

pub async fn reset_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    reset_timer_impl(state)
        .await
        .map_err(|error| state.command_error("reset_timer", &error))
}

pub async fn refresh_session(state: &AppState) -> Result<TimerStateResponse, String> {
    refresh_session_impl(state)
        .await
        .map_err(|error| state.command_error("refresh_session", &error))
}

pub async fn get_timer_state(state: &AppState) -> Result<TimerStateResponse, String> {
    get_timer_state_impl(state)
        .await
        .map_err(|error| state.command_error("get_timer_state", &error))
}

pub fn get_settings(state: &AppState) -> Result<SettingsResponse, String> {
    get_settings_impl(state).map_err(|error| state.command_error("get_settings", &error))
}

pub async fn update_settings(
    state: &AppState,
    patch: SettingsPatch,
) -> Result<SettingsResponse, String> {
    update_settings_impl(state, patch)
        .await
        .map_err(|error| state.command_error("update_settings", &error))
}

pub async fn shutdown(state: &AppState) -> Result<TimerStateResponse, String> {
    shutdown_impl(state)
        .await
        .map_err(|error| state.command_error("shutdown", &error))
}
