//! Status command handler.

use anyhow::Result;
use scribble_core::config::Config;
use scribble_core::status::{STATUS_UNAVAILABLE, StatusClient};

pub async fn run(config: &Config) -> Result<()> {
    let message = match StatusClient::from_config(&config.status)? {
        Some(client) => client.fetch_message().await,
        None => STATUS_UNAVAILABLE.to_string(),
    };
    println!("{message}");
    Ok(())
}
