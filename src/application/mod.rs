pub mod bootstrap;
pub mod commands;
pub mod countdown;
pub mod pomodoro_timer;
pub mod settings_store;
