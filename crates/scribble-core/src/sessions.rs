//! Session persistence and selection.
//!
//! All scribbles live in a single JSON file, newest first:
//!
//! ```json
//! { "active": "1735689600000", "sessions": [ { "id": "...", "title": "scribble 1", ... } ] }
//! ```
//!
//! The whole mapping is rewritten on every change. Missing or malformed files
//! load as an empty store; a bare array of sessions is also accepted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::paths::sessions_path;

/// First message of every new session.
pub const GREETING: &str = "meow! new paper, new doodles! what is on your mind?";

/// Title prefix for generated session titles.
const TITLE_PREFIX: &str = "scribble";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// Inline image payload attached to a model message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    /// MIME type (e.g., "image/png")
    pub mime_type: String,
    /// Base64-encoded image data
    pub data: String,
}

impl InlineImage {
    /// Encodes raw bytes into an inline image.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Decodes the base64 payload.
    ///
    /// # Errors
    /// Returns an error if the payload is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .with_context(|| format!("Failed to decode base64 image data ({})", self.mime_type))
    }

    /// File extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// A single message in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineImage>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            image: None,
        }
    }
}

/// One persisted conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub updated_at: i64,
}

impl Session {
    fn new(id: String, title: String, now: i64) -> Self {
        Self {
            id,
            title,
            messages: vec![Message::model(GREETING)],
            updated_at: now,
        }
    }

    /// Marks the session as updated now.
    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    /// Formats `updated_at` for display.
    pub fn updated_at_display(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.updated_at).map_or_else(
            || "unknown".to_string(),
            |ts| ts.format("%Y-%m-%d %H:%M").to_string(),
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    active: Option<String>,
    #[serde(default)]
    sessions: Vec<Session>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSessions {
    File(StoreFile),
    Bare(Vec<Session>),
}

/// In-memory cache of all sessions, written through to disk on every change.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    sessions: Vec<Session>,
    active: Option<String>,
}

impl SessionStore {
    /// Opens the store at the default location.
    pub fn open_default() -> Self {
        Self::open(sessions_path())
    }

    /// Opens the store at `path`, loading whatever is there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = read_store_file(&path);
        let active = file
            .active
            .filter(|id| file.sessions.iter().any(|s| &s.id == id));
        Self {
            path,
            sessions: file.sessions,
            active,
        }
    }

    /// Returns all sessions persisted at `path` (empty if absent or malformed).
    pub fn load(path: &Path) -> Vec<Session> {
        read_store_file(path).sessions
    }

    /// Sessions in display order (newest first).
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Finds a session by exact id, or by title (case-insensitive).
    pub fn find(&self, key: &str) -> Option<&Session> {
        let key = key.trim();
        self.get(key).or_else(|| {
            self.sessions
                .iter()
                .find(|s| s.title.eq_ignore_ascii_case(key))
        })
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    /// Serializes the full mapping back to disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let file = StoreFileRef {
            active: self.active.as_deref(),
            sessions: &self.sessions,
        };
        let json = serde_json::to_string(&file).context("serialize sessions")?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write sessions to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }

    /// Saves, logging instead of failing. In-memory state stays authoritative.
    pub(crate) fn persist(&self) {
        if let Err(err) = self.save() {
            warn!(path = %self.path.display(), error = %format!("{err:#}"), "failed to persist sessions");
        }
    }

    /// Creates a new session with a greeting, makes it active and persists.
    pub fn create(&mut self) -> &Session {
        let now = now_millis();
        let id = self.unique_id(now);
        let title = format!("{TITLE_PREFIX} {}", self.sessions.len() + 1);
        debug!(%id, %title, "creating session");

        self.sessions.insert(0, Session::new(id.clone(), title, now));
        self.active = Some(id);
        self.persist();
        &self.sessions[0]
    }

    /// Removes a session. If it was active, no session is active afterwards.
    ///
    /// Returns false if no session has that id.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        debug!(%id, "deleted session");
        self.persist();
        true
    }

    /// Makes an existing session active.
    ///
    /// # Errors
    /// Returns an error if the session does not exist.
    pub fn select(&mut self, id: &str) -> Result<&Session> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| anyhow!("No scribble with id '{id}'"))?;
        self.active = Some(id.to_string());
        self.persist();
        Ok(&self.sessions[index])
    }

    /// Renames a session.
    ///
    /// # Errors
    /// Returns an error if the title is blank or the session does not exist.
    pub fn rename(&mut self, id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            bail!("Title cannot be empty");
        }
        self.modify(id, |session| session.title = title.to_string())
            .ok_or_else(|| anyhow!("No scribble with id '{id}'"))
    }

    /// Guarantees an active session: keeps the current one, otherwise picks
    /// the newest, otherwise creates exactly one default session.
    pub fn ensure_active(&mut self) -> &Session {
        let index = self
            .active
            .as_deref()
            .and_then(|id| self.sessions.iter().position(|s| s.id == id));

        if let Some(index) = index {
            return &self.sessions[index];
        }

        if self.sessions.is_empty() {
            return self.create();
        }

        self.active = Some(self.sessions[0].id.clone());
        self.persist();
        &self.sessions[0]
    }

    /// Applies `f` to a session and persists the result.
    pub(crate) fn modify<R>(&mut self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let session = self.sessions.iter_mut().find(|s| s.id == id)?;
        let result = f(session);
        self.persist();
        Some(result)
    }

    fn unique_id(&self, now: i64) -> String {
        let mut candidate = now;
        while self.get(&candidate.to_string()).is_some() {
            candidate += 1;
        }
        candidate.to_string()
    }
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    active: Option<&'a str>,
    sessions: &'a [Session],
}

fn read_store_file(path: &Path) -> StoreFile {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return StoreFile::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable sessions file, starting empty");
            return StoreFile::default();
        }
    };

    if contents.trim().is_empty() {
        return StoreFile::default();
    }

    match serde_json::from_str::<StoredSessions>(&contents) {
        Ok(StoredSessions::File(file)) => file,
        Ok(StoredSessions::Bare(sessions)) => StoreFile {
            active: None,
            sessions,
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed sessions file, starting empty");
            StoreFile::default()
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
