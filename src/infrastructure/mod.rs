pub mod command_log;
pub mod config;
pub mod error;
pub mod kv_store;
pub mod notifier;
pub mod session_api;
pub mod settings_api;
