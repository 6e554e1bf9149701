//! Send command handler.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use scribble_core::config::{Config, Preferences};
use scribble_core::exchange::{
    self, ExchangeOutcome, MISSING_CREDENTIAL_TEXT, SendError, Submission,
};
use scribble_core::providers::gemini::{GeminiClient, GeminiConfig};
use scribble_core::sessions::{InlineImage, SessionStore};

use super::render::spawn_renderer_task;

pub struct SendRunOptions<'a> {
    pub prompt: &'a str,
    pub doodle: bool,
    pub out: Option<&'a str>,
    pub config: &'a Config,
}

pub async fn run(options: SendRunOptions<'_>) -> Result<()> {
    let preferences = options.config.preferences();
    if preferences.credential().is_none() {
        println!("{MISSING_CREDENTIAL_TEXT}");
        return Ok(());
    }
    let client = gemini_client(options.config, &preferences)?;
    let mut store = SessionStore::open_default();

    let submission = Submission {
        prompt: options.prompt.to_string(),
        force_image: options.doodle,
    };
    let outcome = send_rendered(&client, &mut store, &preferences, submission).await?;

    if let Some(image) = &outcome.reply.image {
        let path = save_doodle(Path::new("."), options.out, image)?;
        println!("{}", path.display());
    }

    Ok(())
}

/// Builds the Gemini client, refusing when no credential is configured.
pub fn gemini_client(config: &Config, preferences: &Preferences) -> Result<GeminiClient> {
    let Some(api_key) = preferences.credential() else {
        return Err(SendError::MissingCredential.into());
    };
    let gemini_config = GeminiConfig::new(api_key, config.effective_base_url())?;
    Ok(GeminiClient::new(gemini_config))
}

/// Runs one exchange while a renderer task prints its events.
pub async fn send_rendered(
    client: &GeminiClient,
    store: &mut SessionStore,
    preferences: &Preferences,
    submission: Submission,
) -> Result<ExchangeOutcome> {
    let (tx, rx) = exchange::create_event_channel();
    let renderer = spawn_renderer_task(rx);

    let result = exchange::run_exchange(client, store, preferences, submission, Some(&tx)).await;

    // Flush every event before reporting the result
    drop(tx);
    let _ = renderer.await;

    Ok(result?)
}

/// Writes a doodle to disk and returns its path.
pub fn save_doodle(root: &Path, out: Option<&str>, image: &InlineImage) -> Result<PathBuf> {
    let bytes = image.decode()?;
    let path = resolve_output_path(root, out, image);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output directory '{}'", parent.display()))?;
    }
    fs::write(&path, bytes).with_context(|| format!("write doodle to '{}'", path.display()))?;
    Ok(path)
}

fn resolve_output_path(root: &Path, out: Option<&str>, image: &InlineImage) -> PathBuf {
    let out_path = out
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    match out_path {
        Some(path) if path.is_absolute() => path,
        Some(path) => root.join(path),
        None => {
            let ts = Utc::now().format("%Y%m%d-%H%M%S");
            root.join(format!("doodle-{ts}.{}", image.extension()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_defaults_to_timestamped_doodle() {
        let image = InlineImage::from_bytes("image/jpeg", &[1]);
        let path = resolve_output_path(Path::new("/tmp/x"), None, &image);

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("doodle-"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(path.parent(), Some(Path::new("/tmp/x")));
    }

    #[test]
    fn relative_output_path_is_joined_to_root() {
        let image = InlineImage::from_bytes("image/png", &[1]);
        let path = resolve_output_path(Path::new("/tmp/x"), Some(" cat.png "), &image);
        assert_eq!(path, PathBuf::from("/tmp/x/cat.png"));
    }
}
