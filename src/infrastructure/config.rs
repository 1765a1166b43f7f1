use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_RESYNC_DELAY_MS: u64 = 2_000;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityMode {
    Local,
    Remote,
}

impl AuthorityMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRuntimeConfig {
    pub authority: AuthorityMode,
    pub session_api_base_url: Option<String>,
    pub tick_interval: Duration,
    pub resync_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBundle {
    pub timezone: Tz,
    pub timer: TimerRuntimeConfig,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Pomodoro",
                "timezone": "UTC"
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "authority": "local",
                "sessionApiBaseUrl": null,
                "tickIntervalMs": DEFAULT_TICK_INTERVAL_MS,
                "resyncDelayMs": DEFAULT_RESYNC_DELAY_MS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let timer_path = config_dir.join(TIMER_JSON);
    let timer = read_config(&timer_path)?;
    Ok(ConfigBundle {
        timezone: parse_timezone(&app)?,
        timer: parse_timer_config(&timer, &timer_path)?,
    })
}

fn parse_timezone(app: &serde_json::Value) -> Result<Tz, InfraError> {
    let name = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("UTC");
    name.parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

fn parse_timer_config(timer: &serde_json::Value, path: &Path) -> Result<TimerRuntimeConfig, InfraError> {
    let raw_authority = timer
        .get("authority")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("local");
    let authority = AuthorityMode::parse(raw_authority).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "unknown authority '{raw_authority}' in {}",
            path.display()
        ))
    })?;

    let session_api_base_url = timer
        .get("sessionApiBaseUrl")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);
    if authority == AuthorityMode::Remote && session_api_base_url.is_none() {
        return Err(InfraError::InvalidConfig(format!(
            "sessionApiBaseUrl is required for remote authority in {}",
            path.display()
        )));
    }

    let tick_interval_ms = timer
        .get("tickIntervalMs")
        .and_then(serde_json::Value::as_u64)
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TICK_INTERVAL_MS);
    let resync_delay_ms = timer
        .get("resyncDelayMs")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(DEFAULT_RESYNC_DELAY_MS);

    Ok(TimerRuntimeConfig {
        authority,
        session_api_base_url,
        tick_interval: Duration::from_millis(tick_interval_ms),
        resync_delay: Duration::from_millis(resync_delay_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_CONFIG: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_CONFIG.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomodoro-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }

        fn write(&self, name: &str, value: serde_json::Value) {
            fs::write(self.path.join(name), value.to_string()).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_describe_a_local_timer() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");

        let bundle = load_configs(&dir.path).expect("load configs");
        assert_eq!(bundle.timezone, Tz::UTC);
        assert_eq!(bundle.timer.authority, AuthorityMode::Local);
        assert_eq!(bundle.timer.tick_interval, Duration::from_secs(1));
        assert_eq!(bundle.timer.resync_delay, Duration::from_secs(2));
        assert_eq!(bundle.timer.session_api_base_url, None);
    }

    #[test]
    fn ensure_default_configs_keeps_existing_files() {
        let dir = TempConfigDir::new();
        dir.write(
            APP_JSON,
            serde_json::json!({"schema": 1, "appName": "Mine", "timezone": "Asia/Tokyo"}),
        );
        ensure_default_configs(&dir.path).expect("write defaults");
        assert_eq!(load_configs(&dir.path).expect("configs").timezone, Tz::Asia__Tokyo);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        dir.write(TIMER_JSON, serde_json::json!({"schema": 2, "authority": "local"}));
        match load_configs(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn remote_authority_requires_base_url() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        dir.write(TIMER_JSON, serde_json::json!({"schema": 1, "authority": "remote"}));
        assert!(matches!(
            load_configs(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write(
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "authority": "Remote",
                "sessionApiBaseUrl": "https://api.example.test/v1/",
                "tickIntervalMs": 250
            }),
        );
        let timer = load_configs(&dir.path).expect("remote config").timer;
        assert_eq!(timer.authority, AuthorityMode::Remote);
        assert_eq!(
            timer.session_api_base_url.as_deref(),
            Some("https://api.example.test/v1/")
        );
        assert_eq!(timer.tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn invalid_timezone_is_reported() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        dir.write(APP_JSON, serde_json::json!({"schema": 1, "timezone": "Mars/Olympus"}));
        assert!(matches!(load_configs(&dir.path), Err(InfraError::InvalidConfig(_))));
    }
}
