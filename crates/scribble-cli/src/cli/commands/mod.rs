//! CLI command handlers.

pub mod chat;
pub mod config;
pub mod render;
pub mod send;
pub mod sessions;
pub mod settings;
pub mod status;
