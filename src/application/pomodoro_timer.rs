use crate::application::countdown::CountdownDriver;
use crate::application::settings_store::SettingsStore;
use crate::domain::models::{DurationConfig, PomodoroPhase, Session, SessionType, TimerState};
use crate::domain::phase_machine::{reduce, PhaseContext, TimerEffect, TimerEvent};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{KeyValueStore, TIMER_STATE_KEY};
use crate::infrastructure::notifier::PhaseNotifier;
use crate::infrastructure::session_api::{SessionApi, StartSessionRequest};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::sleep;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RESYNC_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct TimerOptions {
    timezone: Tz,
    tick_interval: Duration,
    resync_delay: Duration,
    now_provider: NowProvider,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            tick_interval: DEFAULT_TICK_INTERVAL,
            resync_delay: DEFAULT_RESYNC_DELAY,
            now_provider: Arc::new(Utc::now),
        }
    }
}

impl TimerOptions {
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_resync_delay(mut self, resync_delay: Duration) -> Self {
        self.resync_delay = resync_delay;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }
}

#[derive(Clone)]
pub enum Authority {
    Local,
    Remote(Arc<dyn SessionApi>),
}

impl Authority {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerOutcome {
    pub state: TimerState,
    pub warning: Option<String>,
}

impl TimerOutcome {
    fn new(state: TimerState, warnings: Vec<String>) -> Self {
        let warning = if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("; "))
        };
        Self { state, warning }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Command,
    Tick,
}

#[derive(Debug, Default)]
struct Applied {
    completion: Option<PomodoroPhase>,
    started: bool,
    persisted: bool,
    warnings: Vec<String>,
}

struct TimerInner {
    state: Mutex<TimerState>,
    settings: Arc<SettingsStore>,
    authority: Authority,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn PhaseNotifier>,
    driver: CountdownDriver,
    // Serializes remote start, resume and pause without holding the state lock.
    remote_gate: Mutex<()>,
    options: TimerOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionView {
    session_id: Option<String>,
    phase: PomodoroPhase,
    running: bool,
    completion_pending: bool,
}

impl SessionView {
    fn of(state: &TimerState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            phase: state.current_phase,
            running: state.is_running,
            completion_pending: state.completion_pending,
        }
    }

    fn phase_to_open(&self) -> PomodoroPhase {
        match self.phase {
            PomodoroPhase::Idle => PomodoroPhase::Focus,
            phase => phase,
        }
    }
}

#[derive(Clone)]
pub struct PomodoroTimer {
    inner: Arc<TimerInner>,
}

impl PomodoroTimer {
    pub async fn open(
        settings: Arc<SettingsStore>,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn PhaseNotifier>,
        authority: Authority,
        options: TimerOptions,
    ) -> Result<Self, InfraError> {
        let config = match settings.load().await {
            Ok(config) => config,
            Err(error) if error.is_transient() => {
                log::warn!("timer settings unavailable, using cached values: {error}");
                settings.current()?
            }
            Err(error) => return Err(error),
        };
        let state = restore_state(store.as_ref(), &config)?;
        log::info!(
            "timer opened: phase={} remaining={}s remote={}",
            state.current_phase.as_str(),
            state.remaining_seconds,
            authority.is_remote()
        );

        Ok(Self {
            inner: Arc::new(TimerInner {
                state: Mutex::new(state),
                settings,
                authority,
                store,
                notifier,
                driver: CountdownDriver::new(options.tick_interval),
                remote_gate: Mutex::new(()),
                options,
            }),
        })
    }

    pub async fn snapshot(&self) -> TimerState {
        self.inner.state.lock().await.clone()
    }

    pub fn settings(&self) -> Result<DurationConfig, InfraError> {
        self.inner.settings.current()
    }

    pub fn is_counting_down(&self) -> bool {
        self.inner.driver.is_active()
    }

    pub async fn start(&self) -> Result<TimerOutcome, InfraError> {
        match &self.inner.authority {
            Authority::Local => self.dispatch(TimerEvent::Start).await,
            Authority::Remote(api) => self.run_remote(api, true).await,
        }
    }

    pub async fn pause(&self) -> Result<TimerOutcome, InfraError> {
        match &self.inner.authority {
            Authority::Local => self.dispatch(TimerEvent::Pause).await,
            Authority::Remote(api) => self.pause_remote(api).await,
        }
    }

    pub async fn resume(&self) -> Result<TimerOutcome, InfraError> {
        match &self.inner.authority {
            Authority::Local => self.dispatch(TimerEvent::Resume).await,
            Authority::Remote(api) => self.run_remote(api, false).await,
        }
    }

    pub async fn stop(&self) -> Result<TimerOutcome, InfraError> {
        self.end_session(TimerEvent::Stop).await
    }

    pub async fn reset(&self) -> Result<TimerOutcome, InfraError> {
        self.end_session(TimerEvent::Reset).await
    }

    pub async fn skip(&self) -> Result<TimerOutcome, InfraError> {
        self.dispatch(TimerEvent::Skip).await
    }

    pub async fn refresh(&self) -> Result<TimerOutcome, InfraError> {
        let Authority::Remote(api) = &self.inner.authority else {
            return Ok(TimerOutcome::new(self.snapshot().await, Vec::new()));
        };
        let event = match api.get_active().await? {
            Some(session) => TimerEvent::SessionSynced(session),
            None => TimerEvent::SessionCleared,
        };
        self.dispatch(event).await
    }

    pub async fn update_settings(&self, config: DurationConfig) -> Result<TimerOutcome, InfraError> {
        self.inner.settings.update(config).await?;
        self.dispatch(TimerEvent::ConfigChanged).await
    }

    pub async fn shutdown(&self) -> Result<TimerState, InfraError> {
        let mut state = self.inner.state.lock().await;
        let applied = self.apply(&mut state, &TimerEvent::Pause, Origin::Command)?;
        self.inner.driver.cancel();
        if !applied.persisted {
            self.persist(&state)?;
        }
        log::info!("timer shut down at {}s remaining", state.remaining_seconds);
        Ok(state.clone())
    }

    async fn dispatch(&self, event: TimerEvent) -> Result<TimerOutcome, InfraError> {
        let mut state = self.inner.state.lock().await;
        let applied = self.apply(&mut state, &event, Origin::Command)?;
        self.settle(state, applied).await
    }

    async fn settle(
        &self,
        state: MutexGuard<'_, TimerState>,
        applied: Applied,
    ) -> Result<TimerOutcome, InfraError> {
        if applied.completion.is_none() {
            return Ok(TimerOutcome::new(state.clone(), applied.warnings));
        }
        let session_id = state.session_id.clone();
        drop(state);
        self.finish_completion(session_id, applied.warnings).await
    }

    async fn run_remote(
        &self,
        api: &Arc<dyn SessionApi>,
        from_idle: bool,
    ) -> Result<TimerOutcome, InfraError> {
        let _gate = self.inner.remote_gate.lock().await;
        let seen = {
            let state = self.inner.state.lock().await;
            let idle = state.current_phase == PomodoroPhase::Idle;
            if state.is_running || state.completion_pending || (idle && !from_idle) {
                return Ok(TimerOutcome::new(state.clone(), Vec::new()));
            }
            SessionView::of(&state)
        };

        let session = match &seen.session_id {
            Some(session_id) => match api.resume(session_id).await {
                Err(InfraError::SessionNotFound(_)) => {
                    log::warn!("remote session {session_id} is gone, starting a new one");
                    api.start(self.session_request(seen.phase_to_open())?).await?
                }
                result => result?,
            },
            None => api.start(self.session_request(seen.phase_to_open())?).await?,
        };
        log::info!("remote session {} is {:?}", session.id, session.status);

        let Some(mut state) = self.relock_unchanged(&seen).await else {
            return self.discard_session(api, session, Vec::new()).await;
        };
        let applied = self.apply(&mut state, &TimerEvent::SessionSynced(session), Origin::Command)?;
        self.settle(state, applied).await
    }

    async fn pause_remote(&self, api: &Arc<dyn SessionApi>) -> Result<TimerOutcome, InfraError> {
        let _gate = self.inner.remote_gate.lock().await;
        let (seen, session_id) = {
            let mut state = self.inner.state.lock().await;
            if !state.is_running {
                return Ok(TimerOutcome::new(state.clone(), Vec::new()));
            }
            let Some(session_id) = state.session_id.clone() else {
                let applied = self.apply(&mut state, &TimerEvent::Pause, Origin::Command)?;
                return self.settle(state, applied).await;
            };
            (SessionView::of(&state), session_id)
        };

        let event = match api.pause(&session_id).await {
            Ok(session) => TimerEvent::SessionSynced(session),
            Err(InfraError::SessionNotFound(_)) => {
                log::warn!("remote session {session_id} is gone, pausing locally");
                TimerEvent::SessionCleared
            }
            Err(error) => return Err(error),
        };
        let Some(mut state) = self.relock_unchanged(&seen).await else {
            return Ok(TimerOutcome::new(self.snapshot().await, Vec::new()));
        };
        let applied = self.apply(&mut state, &event, Origin::Command)?;
        self.settle(state, applied).await
    }

    async fn end_session(&self, event: TimerEvent) -> Result<TimerOutcome, InfraError> {
        let mut state = self.inner.state.lock().await;
        let session_id = state.session_id.clone();
        let applied = self.apply(&mut state, &event, Origin::Command)?;
        let snapshot = state.clone();
        drop(state);

        let mut warnings = applied.warnings;
        if let (Authority::Remote(api), Some(session_id)) = (&self.inner.authority, session_id) {
            match api.cancel(&session_id).await {
                Ok(()) | Err(InfraError::SessionNotFound(_)) => {}
                Err(error) => {
                    log::warn!("remote session {session_id} not cancelled: {error}");
                    warnings.push(format!("remote session not cancelled: {error}"));
                }
            }
        }
        Ok(TimerOutcome::new(snapshot, warnings))
    }

    // Runs outside the state lock; `completion_pending` keeps ticks and skips out.
    async fn finish_completion(
        &self,
        session_id: Option<String>,
        mut warnings: Vec<String>,
    ) -> Result<TimerOutcome, InfraError> {
        if let (Authority::Remote(api), Some(session_id)) = (&self.inner.authority, session_id) {
            match api.complete(&session_id).await {
                Ok(()) => {}
                Err(InfraError::SessionNotFound(_)) => {
                    log::info!("session {session_id} already ended on the server");
                }
                Err(error) => {
                    log::warn!("session {session_id} completion failed: {error}");
                    warnings.push(format!("session completion not confirmed: {error}"));
                    self.retry_complete(Arc::clone(api), session_id);
                }
            }
        }

        let mut state = self.inner.state.lock().await;
        let applied = self.apply(&mut state, &TimerEvent::CompletePhase, Origin::Command)?;
        warnings.extend(applied.warnings);
        let api = match (&self.inner.authority, applied.started) {
            (Authority::Remote(api), true) => Arc::clone(api),
            _ => return Ok(TimerOutcome::new(state.clone(), warnings)),
        };
        let seen = SessionView::of(&state);
        drop(state);
        self.open_remote_session(&api, seen, warnings).await
    }

    async fn open_remote_session(
        &self,
        api: &Arc<dyn SessionApi>,
        seen: SessionView,
        mut warnings: Vec<String>,
    ) -> Result<TimerOutcome, InfraError> {
        let session = match api.start(self.session_request(seen.phase_to_open())?).await {
            Ok(session) => session,
            Err(error) => {
                log::warn!("remote session for {} not opened: {error}", seen.phase.as_str());
                warnings.push(format!("remote session not opened: {error}"));
                return Ok(TimerOutcome::new(self.snapshot().await, warnings));
            }
        };

        let Some(mut state) = self.relock_unchanged(&seen).await else {
            return self.discard_session(api, session, warnings).await;
        };
        let applied = self.apply(&mut state, &TimerEvent::SessionSynced(session), Origin::Command)?;
        warnings.extend(applied.warnings);
        if applied.completion.is_some() {
            self.spawn_completion(state.session_id.clone());
        }
        Ok(TimerOutcome::new(state.clone(), warnings))
    }

    async fn relock_unchanged(&self, seen: &SessionView) -> Option<MutexGuard<'_, TimerState>> {
        let state = self.inner.state.lock().await;
        (SessionView::of(&state) == *seen).then_some(state)
    }

    // Another command moved the timer while the request was in flight.
    async fn discard_session(
        &self,
        api: &Arc<dyn SessionApi>,
        session: Session,
        mut warnings: Vec<String>,
    ) -> Result<TimerOutcome, InfraError> {
        let state = self.snapshot().await;
        log::info!("timer moved on while session {} was requested, dropping it", session.id);
        if state.session_id.as_deref() != Some(session.id.as_str()) && session.is_active() {
            if let Err(error) = api.cancel(&session.id).await {
                log::warn!("remote session {} not cancelled: {error}", session.id);
                warnings.push(format!("remote session not cancelled: {error}"));
            }
        }
        Ok(TimerOutcome::new(state, warnings))
    }

    fn session_request(&self, phase: PomodoroPhase) -> Result<StartSessionRequest, InfraError> {
        let config = self.inner.settings.current()?;
        Ok(StartSessionRequest {
            session_type: SessionType::for_phase(phase),
            duration: config.minutes_for(phase),
        })
    }

    fn retry_complete(&self, api: Arc<dyn SessionApi>, session_id: String) {
        let delay = self.inner.options.resync_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            match api.complete(&session_id).await {
                Ok(()) => log::info!("session {session_id} completion confirmed on retry"),
                Err(error) => log::error!("session {session_id} completion retry failed: {error}"),
            }
        });
    }

    fn spawn_completion(&self, session_id: Option<String>) {
        let timer = self.clone();
        tokio::spawn(async move {
            match timer.finish_completion(session_id, Vec::new()).await {
                Ok(outcome) => {
                    if let Some(warning) = outcome.warning {
                        log::warn!("phase completion: {warning}");
                    }
                }
                Err(error) => log::error!("phase completion failed: {error}"),
            }
        });
    }

    fn start_countdown(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.driver.start(move |generation| {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                PomodoroTimer { inner }.on_tick(generation).await
            }
        });
    }

    async fn on_tick(&self, generation: u64) -> ControlFlow<()> {
        let mut state = self.inner.state.lock().await;
        if !self.inner.driver.is_current(generation) || !state.is_running {
            return ControlFlow::Break(());
        }

        let applied = match self.apply(&mut state, &TimerEvent::Tick, Origin::Tick) {
            Ok(applied) => applied,
            Err(error) => {
                log::error!("tick rejected: {error}");
                return ControlFlow::Continue(());
            }
        };
        for warning in &applied.warnings {
            log::warn!("{warning}");
        }

        if applied.completion.is_some() {
            let session_id = state.session_id.clone();
            drop(state);
            self.spawn_completion(session_id);
            return ControlFlow::Break(());
        }
        if state.is_running {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    // Caller holds the state lock.
    fn apply(
        &self,
        state: &mut TimerState,
        event: &TimerEvent,
        origin: Origin,
    ) -> Result<Applied, InfraError> {
        let config = self.inner.settings.current()?;
        let context = PhaseContext {
            config: &config,
            today: self.today(),
        };
        let transition = reduce(state, event, &context);
        let mut applied = Applied {
            completion: transition.begun_completion(),
            ..Applied::default()
        };
        *state = transition.state;

        for effect in transition.effects {
            match effect {
                TimerEffect::StartCountdown => {
                    self.start_countdown();
                    applied.started = true;
                }
                TimerEffect::StopCountdown => match origin {
                    Origin::Command => self.inner.driver.cancel(),
                    // The tick task ends itself.
                    Origin::Tick => self.inner.driver.retire(),
                },
                TimerEffect::BeginCompletion { phase } => {
                    log::info!("{} phase finished", phase.as_str());
                }
                TimerEffect::PlayCue { focus_ended: true } => self.inner.notifier.play_focus_complete(),
                TimerEffect::PlayCue { focus_ended: false } => self.inner.notifier.play_break_complete(),
                TimerEffect::Persist => {
                    applied.persisted = true;
                    if let Err(error) = self.persist(state) {
                        log::warn!("timer state not saved: {error}");
                        applied.warnings.push(format!("timer state not saved: {error}"));
                    }
                }
            }
        }
        Ok(applied)
    }

    fn persist(&self, state: &TimerState) -> Result<(), InfraError> {
        self.inner
            .store
            .save(TIMER_STATE_KEY, &serde_json::to_value(state)?)
    }

    fn today(&self) -> NaiveDate {
        (self.inner.options.now_provider)()
            .with_timezone(&self.inner.options.timezone)
            .date_naive()
    }
}

fn restore_state(store: &dyn KeyValueStore, config: &DurationConfig) -> Result<TimerState, InfraError> {
    let Some(value) = store.load(TIMER_STATE_KEY)? else {
        return Ok(TimerState::initial(config));
    };
    match serde_json::from_value::<TimerState>(value) {
        Ok(state) => Ok(state.restored(config)),
        Err(error) => {
            log::warn!("discarding unreadable timer state: {error}");
            Ok(TimerState::initial(config))
        }
    }
}
