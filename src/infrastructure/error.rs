use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Session sync failed: {0}")]
    Sync(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl InfraError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Sync(_))
    }
}
