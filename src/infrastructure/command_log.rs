use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const COMMAND_LOG_FILE: &str = "commands.log";

#[derive(Debug)]
pub struct CommandLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl CommandLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(COMMAND_LOG_FILE),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, command: &str, message: &str) {
        self.append("info", command, message);
    }

    pub fn warn(&self, command: &str, message: &str) {
        self.append("warn", command, message);
    }

    pub fn error(&self, command: &str, message: &str) {
        self.append("error", command, message);
    }

    fn append(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", payload);
            }
            Err(error) => log::warn!("command log unavailable at {}: {error}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_LOG: AtomicUsize = AtomicUsize::new(0);

    struct TempLogDir {
        path: PathBuf,
    }

    impl TempLogDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_LOG.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomodoro-log-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp log dir");
            Self { path }
        }
    }

    impl Drop for TempLogDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn entries_are_appended_as_json_lines() {
        let dir = TempLogDir::new();
        let log = CommandLog::new(&dir.path);
        log.info("start_timer", "started focus");
        log.error("pause_timer", "session api error: http 502");

        let raw = fs::read_to_string(log.path()).expect("read log");
        let entries: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["command"], "start_timer");
        assert_eq!(entries[0]["level"], "info");
        assert_eq!(entries[1]["level"], "error");
        assert!(entries[1]["timestamp"].as_str().is_some());
    }

    #[test]
    fn missing_directory_is_not_fatal() {
        let dir = TempLogDir::new();
        let log = CommandLog::new(&dir.path.join("absent"));
        log.warn("refresh_session", "ignored");
        assert!(!log.path().exists());
    }
}
