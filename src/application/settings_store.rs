use crate::domain::models::{DurationConfig, PomodoroPhase};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::settings_api::SettingsApi;
use std::sync::{Arc, RwLock};

pub struct SettingsStore {
    api: Arc<dyn SettingsApi>,
    current: RwLock<DurationConfig>,
}

impl SettingsStore {
    pub fn new(api: Arc<dyn SettingsApi>) -> Self {
        Self {
            api,
            current: RwLock::new(DurationConfig::default()),
        }
    }

    pub async fn load(&self) -> Result<DurationConfig, InfraError> {
        let loaded = self.api.get().await?.clamped();
        self.replace(loaded.clone())?;
        Ok(loaded)
    }

    pub async fn update(&self, config: DurationConfig) -> Result<DurationConfig, InfraError> {
        let stored = self.api.set(config.clamped()).await?.clamped();
        self.replace(stored.clone())?;
        log::info!(
            "timer settings updated: focus={} short_break={} long_break={} interval={}",
            stored.focus_minutes,
            stored.short_break_minutes,
            stored.long_break_minutes,
            stored.long_break_interval
        );
        Ok(stored)
    }

    pub fn current(&self) -> Result<DurationConfig, InfraError> {
        self.current
            .read()
            .map(|config| config.clone())
            .map_err(|error| InfraError::Lock(format!("settings lock poisoned: {error}")))
    }

    pub fn seconds_for(&self, phase: PomodoroPhase) -> Result<u32, InfraError> {
        Ok(self.current()?.seconds_for(phase))
    }

    fn replace(&self, config: DurationConfig) -> Result<(), InfraError> {
        let mut current = self
            .current
            .write()
            .map_err(|error| InfraError::Lock(format!("settings lock poisoned: {error}")))?;
        *current = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSettingsApi {
        stored: Mutex<Option<DurationConfig>>,
        set_calls: AtomicUsize,
        fail_set: bool,
    }

    #[async_trait]
    impl SettingsApi for FakeSettingsApi {
        async fn get(&self) -> Result<DurationConfig, InfraError> {
            let stored = self.stored.lock().expect("fake settings lock");
            Ok(stored.clone().unwrap_or_default())
        }

        async fn set(&self, config: DurationConfig) -> Result<DurationConfig, InfraError> {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                return Err(InfraError::Sync("settings backend unavailable".to_string()));
            }
            *self.stored.lock().expect("fake settings lock") = Some(config.clone());
            Ok(config)
        }
    }

    fn out_of_range() -> DurationConfig {
        DurationConfig {
            focus_minutes: 500,
            short_break_minutes: 0,
            long_break_minutes: 121,
            long_break_interval: 40,
            auto_start_next_phase: true,
        }
    }

    #[tokio::test]
    async fn load_clamps_backend_values() {
        let api = Arc::new(FakeSettingsApi::default());
        *api.stored.lock().expect("fake settings lock") = Some(out_of_range());
        let store = SettingsStore::new(api);

        let loaded = store.load().await.expect("load settings");
        assert_eq!(loaded.focus_minutes, 120);
        assert_eq!(loaded.short_break_minutes, 1);
        assert_eq!(loaded.long_break_minutes, 120);
        assert_eq!(loaded.long_break_interval, 12);
        assert_eq!(store.current().expect("current"), loaded);
    }

    #[tokio::test]
    async fn update_writes_clamped_values_and_refreshes_cache() {
        let api = Arc::new(FakeSettingsApi::default());
        let store = SettingsStore::new(Arc::clone(&api) as Arc<dyn SettingsApi>);

        let stored = store.update(out_of_range()).await.expect("update settings");
        let persisted = api
            .stored
            .lock()
            .expect("fake settings lock")
            .clone()
            .expect("persisted config");
        assert_eq!(persisted, stored);
        assert_eq!(persisted.focus_minutes, 120);
        assert_eq!(store.seconds_for(PomodoroPhase::ShortBreak).expect("seconds"), 60);
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_settings() {
        let api = Arc::new(FakeSettingsApi {
            fail_set: true,
            ..FakeSettingsApi::default()
        });
        let store = SettingsStore::new(Arc::clone(&api) as Arc<dyn SettingsApi>);

        assert!(store.update(out_of_range()).await.is_err());
        assert_eq!(api.set_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current().expect("current"), DurationConfig::default());
    }
}
