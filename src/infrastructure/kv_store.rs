use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub const TIMER_STATE_KEY: &str = "timer_state";
pub const DURATION_CONFIG_KEY: &str = "duration_config";

pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>, InfraError>;
    fn save(&self, key: &str, value: &Value) -> Result<(), InfraError>;
}

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

fn normalized_key(key: &str) -> Result<&str, InfraError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(InfraError::InvalidConfig("store key must not be empty".to_string()));
    }
    Ok(key)
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Value>, InfraError> {
        let key = normalized_key(key)?;
        let connection = self.connect()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), InfraError> {
        let key = normalized_key(key)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, Value>>,
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Value>, InfraError> {
        let key = normalized_key(key)?;
        let values = self
            .values
            .lock()
            .map_err(|error| InfraError::Lock(format!("key-value store lock poisoned: {error}")))?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), InfraError> {
        let key = normalized_key(key)?;
        let mut values = self
            .values
            .lock()
            .map_err(|error| InfraError::Lock(format!("key-value store lock poisoned: {error}")))?;
        values.insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "pomodoro-kv-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("store.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn sqlite_store_returns_none_for_missing_key() {
        let database = TempDatabase::new();
        let store = SqliteKeyValueStore::new(&database.path);
        assert!(store.load(TIMER_STATE_KEY).expect("load").is_none());
    }

    #[test]
    fn sqlite_store_overwrites_existing_value() {
        let database = TempDatabase::new();
        let store = SqliteKeyValueStore::new(&database.path);
        store
            .save(DURATION_CONFIG_KEY, &serde_json::json!({"focus_minutes": 25}))
            .expect("first save");
        store
            .save(DURATION_CONFIG_KEY, &serde_json::json!({"focus_minutes": 50}))
            .expect("second save");

        let loaded = store.load(DURATION_CONFIG_KEY).expect("load").expect("value exists");
        assert_eq!(loaded["focus_minutes"], 50);
    }

    #[test]
    fn stores_reject_blank_keys() {
        let store = InMemoryKeyValueStore::default();
        assert!(store.save("  ", &Value::Null).is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn in_memory_store_keeps_values_per_key() {
        let store = InMemoryKeyValueStore::default();
        store.save("a", &serde_json::json!(1)).expect("save a");
        store.save("b", &serde_json::json!(2)).expect("save b");
        assert_eq!(store.load(" a ").expect("load a"), Some(serde_json::json!(1)));
        assert_eq!(store.load("b").expect("load b"), Some(serde_json::json!(2)));
    }
}
