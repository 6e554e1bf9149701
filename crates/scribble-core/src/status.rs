//! Presence status from the Lanyard API.
//!
//! Status is decorative: every failure collapses to a fixed placeholder and is
//! only logged.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::StatusConfig;
use crate::providers::shared::{USER_AGENT, resolve_base_url};

const DEFAULT_BASE_URL: &str = "https://api.lanyard.rest";

/// Environment variable overriding the presence endpoint.
pub const BASE_URL_ENV_VAR: &str = "LANYARD_BASE_URL";

/// Shown before the first poll completes.
pub const STATUS_LOADING: &str = "loading...";

/// Shown whenever the status cannot be fetched.
pub const STATUS_UNAVAILABLE: &str = "status unavailable... maybe the pencil broke?";

/// Discord presence states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Idle,
    DoNotDisturb,
    Offline,
}

impl Presence {
    /// Maps a raw `discord_status`; unknown values count as offline.
    pub fn from_discord_status(status: &str) -> Self {
        match status {
            "online" => Presence::Online,
            "idle" => Presence::Idle,
            "dnd" => Presence::DoNotDisturb,
            _ => Presence::Offline,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Presence::Online => "that's weird, why am i online? huh?!",
            Presence::Idle => "i'm kinda online so just don't be shy, write me a dm",
            Presence::DoNotDisturb => "angry or just sad, idk, just don't write me",
            Presence::Offline => "i'm asleep Zzzz",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LanyardResponse {
    #[serde(default)]
    success: bool,
    data: Option<LanyardData>,
}

#[derive(Debug, Deserialize)]
struct LanyardData {
    discord_status: Option<String>,
}

/// Client for a single user's presence.
#[derive(Debug, Clone)]
pub struct StatusClient {
    base_url: String,
    user_id: String,
    http: reqwest::Client,
}

impl StatusClient {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Builds a client from config. Returns `None` when no user id is set.
    ///
    /// # Errors
    /// Returns an error if the configured base URL is malformed.
    pub fn from_config(config: &StatusConfig) -> Result<Option<Self>> {
        let Some(user_id) = config.effective_user_id() else {
            return Ok(None);
        };
        let base_url = resolve_base_url(
            config.base_url.as_deref(),
            BASE_URL_ENV_VAR,
            DEFAULT_BASE_URL,
            "Lanyard",
        )?;
        Ok(Some(Self::new(base_url, user_id)))
    }

    /// Fetches the current presence.
    ///
    /// # Errors
    /// Returns an error on network failure, non-success status or an
    /// unexpected body.
    pub async fn fetch(&self) -> Result<Presence> {
        let url = format!("{}/v1/users/{}", self.base_url, self.user_id);
        let response = self
            .http
            .get(&url)
            .header("user-agent", USER_AGENT)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Presence lookup failed with HTTP {status}"));
        }

        let body: LanyardResponse = response
            .json()
            .await
            .context("Failed to parse presence response")?;
        if !body.success {
            return Err(anyhow!("Presence lookup was not successful"));
        }

        let raw = body
            .data
            .and_then(|data| data.discord_status)
            .context("Presence response has no discord_status")?;
        Ok(Presence::from_discord_status(&raw))
    }

    /// Fetches the display message. Never fails.
    pub async fn fetch_message(&self) -> String {
        match self.fetch().await {
            Ok(presence) => presence.message().to_string(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "status poll failed");
                STATUS_UNAVAILABLE.to_string()
            }
        }
    }
}

/// Polls immediately and then every `interval` until `cancel` fires.
///
/// The receiver starts at [`STATUS_LOADING`].
pub fn spawn_status_poller(
    client: StatusClient,
    interval: Duration,
    cancel: CancellationToken,
) -> (watch::Receiver<String>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(STATUS_LOADING.to_string());

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let message = tokio::select! {
                        () = cancel.cancelled() => break,
                        message = client.fetch_message() => message,
                    };
                    debug!(%message, "status updated");
                    tx.send_replace(message);
                }
            }
        }
        debug!("status poller stopped");
    });

    (rx, handle)
}
