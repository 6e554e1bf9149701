//! Core scribble library (sessions, dispatch, providers, config).

pub mod appender;
pub mod config;
pub mod dispatch;
pub mod exchange;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod providers;
pub mod sessions;
pub mod status;
