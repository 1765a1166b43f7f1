use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MIN_PHASE_MINUTES: u32 = 1;
pub const MAX_FOCUS_MINUTES: u32 = 120;
pub const MAX_SHORT_BREAK_MINUTES: u32 = 60;
pub const MAX_LONG_BREAK_MINUTES: u32 = 120;
pub const MIN_LONG_BREAK_INTERVAL: u32 = 1;
pub const MAX_LONG_BREAK_INTERVAL: u32 = 12;

const DEFAULT_FOCUS_MINUTES: u32 = 25;
const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
const DEFAULT_LONG_BREAK_INTERVAL: u32 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroPhase {
    Focus,
    ShortBreak,
    LongBreak,
    #[default]
    Idle,
}

impl PomodoroPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
            Self::Idle => "idle",
        }
    }

    pub fn is_break(self) -> bool {
        matches!(self, Self::ShortBreak | Self::LongBreak)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurationConfig {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
    #[serde(default)]
    pub auto_start_next_phase: bool,
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            long_break_interval: DEFAULT_LONG_BREAK_INTERVAL,
            auto_start_next_phase: false,
        }
    }
}

impl DurationConfig {
    pub fn clamped(&self) -> Self {
        Self {
            focus_minutes: self.focus_minutes.clamp(MIN_PHASE_MINUTES, MAX_FOCUS_MINUTES),
            short_break_minutes: self
                .short_break_minutes
                .clamp(MIN_PHASE_MINUTES, MAX_SHORT_BREAK_MINUTES),
            long_break_minutes: self
                .long_break_minutes
                .clamp(MIN_PHASE_MINUTES, MAX_LONG_BREAK_MINUTES),
            long_break_interval: self
                .long_break_interval
                .clamp(MIN_LONG_BREAK_INTERVAL, MAX_LONG_BREAK_INTERVAL),
            auto_start_next_phase: self.auto_start_next_phase,
        }
    }

    pub fn minutes_for(&self, phase: PomodoroPhase) -> u32 {
        match phase {
            // Idle holds the pending duration of the next focus phase.
            PomodoroPhase::Focus | PomodoroPhase::Idle => self.focus_minutes,
            PomodoroPhase::ShortBreak => self.short_break_minutes,
            PomodoroPhase::LongBreak => self.long_break_minutes,
        }
    }

    pub fn seconds_for(&self, phase: PomodoroPhase) -> u32 {
        self.minutes_for(phase).saturating_mul(60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerState {
    pub current_phase: PomodoroPhase,
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub completed_focus_count: u32,
    pub sessions_until_long_break: u32,
    pub daily_streak: u32,
    pub weekly_progress: u32,
    pub last_focus_completed_on: Option<NaiveDate>,
    #[serde(default)]
    pub session_id: Option<String>,
    // Set between a zero-crossing and the application of its completion.
    #[serde(skip)]
    pub completion_pending: bool,
}

impl TimerState {
    pub fn initial(config: &DurationConfig) -> Self {
        Self {
            current_phase: PomodoroPhase::Idle,
            remaining_seconds: config.seconds_for(PomodoroPhase::Focus),
            is_running: false,
            completed_focus_count: 0,
            sessions_until_long_break: config.long_break_interval,
            daily_streak: 0,
            weekly_progress: 0,
            last_focus_completed_on: None,
            session_id: None,
            completion_pending: false,
        }
    }

    pub fn restored(mut self, config: &DurationConfig) -> Self {
        self.is_running = false;
        self.completion_pending = false;
        if self.remaining_seconds == 0 {
            self.remaining_seconds = config.seconds_for(self.current_phase);
        }
        if self.sessions_until_long_break == 0
            || self.sessions_until_long_break > config.long_break_interval
        {
            self.sessions_until_long_break = config.long_break_interval;
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.remaining_seconds == 0 && self.is_running {
            return Err("timer.is_running must be false when remaining_seconds is 0".to_string());
        }
        if self.current_phase == PomodoroPhase::Idle && self.is_running {
            return Err("timer.is_running must be false while idle".to_string());
        }
        if self.completion_pending && self.is_running {
            return Err("timer.is_running must be false while completion is pending".to_string());
        }
        Ok(())
    }

    pub fn effective_daily_streak(&self, today: NaiveDate) -> u32 {
        match self.last_focus_completed_on {
            Some(last) if last == today || last.succ_opt() == Some(today) => self.daily_streak,
            _ => 0,
        }
    }

    pub fn effective_weekly_progress(&self, today: NaiveDate) -> u32 {
        match self.last_focus_completed_on {
            Some(last) if same_iso_week(last, today) => self.weekly_progress,
            _ => 0,
        }
    }
}

pub fn same_iso_week(left: NaiveDate, right: NaiveDate) -> bool {
    let left = left.iso_week();
    let right = right.iso_week();
    left.year() == right.year() && left.week() == right.week()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Focus,
    Break,
}

impl SessionType {
    pub fn for_phase(phase: PomodoroPhase) -> Self {
        match phase {
            PomodoroPhase::ShortBreak | PomodoroPhase::LongBreak => Self::Break,
            PomodoroPhase::Focus | PomodoroPhase::Idle => Self::Focus,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub remaining_time: u32,
    pub duration: u32,
}

impl Session {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        if self.duration == 0 {
            return Err("session.duration must be > 0".to_string());
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Running | SessionStatus::Paused)
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
