use crate::domain::models::{
    same_iso_week, DurationConfig, PomodoroPhase, Session, SessionStatus, SessionType, TimerState,
};
use chrono::NaiveDate;

pub const PERSIST_EVERY_SECONDS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Start,
    Pause,
    Resume,
    Stop,
    Skip,
    Tick,
    CompletePhase,
    Reset,
    ConfigChanged,
    SessionSynced(Session),
    SessionCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEffect {
    StartCountdown,
    StopCountdown,
    BeginCompletion { phase: PomodoroPhase },
    PlayCue { focus_ended: bool },
    Persist,
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    pub config: &'a DurationConfig,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: TimerState,
    pub effects: Vec<TimerEffect>,
}

impl Transition {
    fn unchanged(state: &TimerState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }

    fn with(state: TimerState, effects: Vec<TimerEffect>) -> Self {
        Self { state, effects }
    }

    pub fn has(&self, effect: TimerEffect) -> bool {
        self.effects.contains(&effect)
    }

    pub fn begun_completion(&self) -> Option<PomodoroPhase> {
        self.effects.iter().find_map(|effect| match effect {
            TimerEffect::BeginCompletion { phase } => Some(*phase),
            _ => None,
        })
    }
}

pub fn reduce(state: &TimerState, event: &TimerEvent, context: &PhaseContext<'_>) -> Transition {
    match event {
        TimerEvent::Start => start(state, context),
        TimerEvent::Pause => pause(state),
        TimerEvent::Resume => resume(state),
        TimerEvent::Stop => stop(state, context),
        TimerEvent::Skip => skip(state),
        TimerEvent::Tick => tick(state),
        TimerEvent::CompletePhase => complete_phase(state, context),
        TimerEvent::Reset => Transition::with(
            TimerState::initial(context.config),
            vec![TimerEffect::StopCountdown, TimerEffect::Persist],
        ),
        TimerEvent::ConfigChanged => config_changed(state, context),
        TimerEvent::SessionSynced(session) => session_synced(state, session, context),
        TimerEvent::SessionCleared => session_cleared(state),
    }
}

pub fn next_daily_streak(last: Option<NaiveDate>, today: NaiveDate, streak: u32) -> u32 {
    match last {
        Some(last) if last == today => streak.max(1),
        Some(last) if last.succ_opt() == Some(today) => streak.saturating_add(1),
        _ => 1,
    }
}

pub fn next_weekly_progress(last: Option<NaiveDate>, today: NaiveDate, progress: u32) -> u32 {
    match last {
        Some(last) if same_iso_week(last, today) => progress.saturating_add(1),
        _ => 1,
    }
}

pub fn successor(
    finished: PomodoroPhase,
    sessions_until_long_break: u32,
    config: &DurationConfig,
) -> (PomodoroPhase, u32) {
    match finished {
        PomodoroPhase::Focus => {
            let left = sessions_until_long_break.saturating_sub(1);
            if left == 0 {
                (PomodoroPhase::LongBreak, config.long_break_interval)
            } else {
                (PomodoroPhase::ShortBreak, left)
            }
        }
        PomodoroPhase::ShortBreak | PomodoroPhase::LongBreak | PomodoroPhase::Idle => {
            (PomodoroPhase::Focus, sessions_until_long_break)
        }
    }
}

fn start(state: &TimerState, context: &PhaseContext<'_>) -> Transition {
    if state.completion_pending || state.is_running {
        return Transition::unchanged(state);
    }

    let mut next = state.clone();
    if next.current_phase == PomodoroPhase::Idle {
        next.current_phase = PomodoroPhase::Focus;
        next.remaining_seconds = context.config.seconds_for(PomodoroPhase::Focus);
    } else if next.remaining_seconds == 0 {
        next.remaining_seconds = context.config.seconds_for(next.current_phase);
    }
    next.is_running = true;
    Transition::with(next, vec![TimerEffect::StartCountdown, TimerEffect::Persist])
}

fn pause(state: &TimerState) -> Transition {
    if !state.is_running {
        return Transition::unchanged(state);
    }
    let mut next = state.clone();
    next.is_running = false;
    Transition::with(next, vec![TimerEffect::StopCountdown, TimerEffect::Persist])
}

fn resume(state: &TimerState) -> Transition {
    if state.is_running
        || state.completion_pending
        || state.current_phase == PomodoroPhase::Idle
        || state.remaining_seconds == 0
    {
        return Transition::unchanged(state);
    }
    let mut next = state.clone();
    next.is_running = true;
    Transition::with(next, vec![TimerEffect::StartCountdown, TimerEffect::Persist])
}

fn stop(state: &TimerState, context: &PhaseContext<'_>) -> Transition {
    let mut next = state.clone();
    next.remaining_seconds = context.config.seconds_for(state.current_phase);
    next.current_phase = PomodoroPhase::Idle;
    next.is_running = false;
    next.completion_pending = false;
    next.session_id = None;
    Transition::with(next, vec![TimerEffect::StopCountdown, TimerEffect::Persist])
}

fn skip(state: &TimerState) -> Transition {
    if state.completion_pending || state.current_phase == PomodoroPhase::Idle {
        return Transition::unchanged(state);
    }
    begin_completion(state.clone())
}

fn tick(state: &TimerState) -> Transition {
    if !state.is_running || state.completion_pending || state.remaining_seconds == 0 {
        return Transition::unchanged(state);
    }

    let mut next = state.clone();
    next.remaining_seconds -= 1;
    if next.remaining_seconds == 0 {
        return begin_completion(next);
    }

    let effects = if next.remaining_seconds % PERSIST_EVERY_SECONDS == 0 {
        vec![TimerEffect::Persist]
    } else {
        Vec::new()
    };
    Transition::with(next, effects)
}

fn begin_completion(mut next: TimerState) -> Transition {
    let phase = next.current_phase;
    next.remaining_seconds = 0;
    next.is_running = false;
    next.completion_pending = true;
    Transition::with(
        next,
        vec![
            TimerEffect::StopCountdown,
            TimerEffect::BeginCompletion { phase },
        ],
    )
}

fn complete_phase(state: &TimerState, context: &PhaseContext<'_>) -> Transition {
    if !state.completion_pending {
        return Transition::unchanged(state);
    }

    let config = context.config;
    let finished = state.current_phase;
    let mut next = state.clone();

    if finished == PomodoroPhase::Focus {
        next.completed_focus_count = next.completed_focus_count.saturating_add(1);
        next.weekly_progress = next_weekly_progress(
            state.last_focus_completed_on,
            context.today,
            state.weekly_progress,
        );
        next.daily_streak = next_daily_streak(
            state.last_focus_completed_on,
            context.today,
            state.daily_streak,
        );
        next.last_focus_completed_on = Some(context.today);
    }

    let (phase, sessions_until_long_break) =
        successor(finished, state.sessions_until_long_break, config);
    next.current_phase = phase;
    next.sessions_until_long_break = sessions_until_long_break;
    next.remaining_seconds = config.seconds_for(phase);
    next.completion_pending = false;
    next.is_running = config.auto_start_next_phase;
    next.session_id = None;

    let mut effects = vec![
        TimerEffect::PlayCue {
            focus_ended: finished == PomodoroPhase::Focus,
        },
        TimerEffect::Persist,
    ];
    if next.is_running {
        effects.push(TimerEffect::StartCountdown);
    }
    Transition::with(next, effects)
}

fn config_changed(state: &TimerState, context: &PhaseContext<'_>) -> Transition {
    let config = context.config;
    let mut next = state.clone();
    if next.sessions_until_long_break == 0
        || next.sessions_until_long_break > config.long_break_interval
    {
        next.sessions_until_long_break = config.long_break_interval;
    }
    if next.current_phase == PomodoroPhase::Idle {
        next.remaining_seconds = config.seconds_for(PomodoroPhase::Focus);
    }
    if next == *state {
        return Transition::unchanged(state);
    }
    Transition::with(next, vec![TimerEffect::Persist])
}

fn session_synced(state: &TimerState, session: &Session, context: &PhaseContext<'_>) -> Transition {
    if state.completion_pending {
        return Transition::unchanged(state);
    }
    if !session.is_active() {
        return session_cleared(state);
    }

    let mut next = state.clone();
    next.session_id = Some(session.id.clone());
    next.current_phase = phase_for_session(state.current_phase, session, context.config);
    next.remaining_seconds = session.remaining_time;
    next.is_running = session.status == SessionStatus::Running;

    if next.is_running && next.remaining_seconds == 0 {
        return begin_completion(next);
    }

    let mut effects = Vec::new();
    if next.is_running && !state.is_running {
        effects.push(TimerEffect::StartCountdown);
    } else if !next.is_running && state.is_running {
        effects.push(TimerEffect::StopCountdown);
    }
    effects.push(TimerEffect::Persist);
    Transition::with(next, effects)
}

fn session_cleared(state: &TimerState) -> Transition {
    if state.session_id.is_none() && !state.is_running {
        return Transition::unchanged(state);
    }
    let mut next = state.clone();
    next.session_id = None;
    let mut effects = Vec::new();
    if next.is_running {
        next.is_running = false;
        effects.push(TimerEffect::StopCountdown);
    }
    effects.push(TimerEffect::Persist);
    Transition::with(next, effects)
}

// The server only knows focus and break; the break kind comes from local state.
fn phase_for_session(
    current: PomodoroPhase,
    session: &Session,
    config: &DurationConfig,
) -> PomodoroPhase {
    match session.session_type {
        SessionType::Focus => PomodoroPhase::Focus,
        SessionType::Break if current.is_break() => current,
        SessionType::Break
            if session.duration == config.long_break_minutes
                && config.long_break_minutes != config.short_break_minutes =>
        {
            PomodoroPhase::LongBreak
        }
        SessionType::Break => PomodoroPhase::ShortBreak,
    }
}
