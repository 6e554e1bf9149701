//! Session command handlers.

use anyhow::{Context, Result};
use scribble_core::sessions::{Session, SessionStore};

pub fn list() {
    let store = SessionStore::open_default();
    print_list(&store);
}

pub fn print_list(store: &SessionStore) {
    if store.is_empty() {
        println!("No scribbles yet.");
        return;
    }

    let active = store.active_id();
    for session in store.sessions() {
        let marker = if Some(session.id.as_str()) == active {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {}  {}  ({} messages)",
            session.title,
            session.id,
            session.updated_at_display(),
            session.messages.len()
        );
    }
}

pub fn show(key: Option<&str>) -> Result<()> {
    let mut store = SessionStore::open_default();
    let session = match key {
        Some(key) => store
            .find(key)
            .with_context(|| format!("No scribble matching '{key}'"))?,
        None => store.ensure_active(),
    };
    print_transcript(session);
    Ok(())
}

/// Prints a session as `role: text` lines.
pub fn print_transcript(session: &Session) {
    println!("# {} ({})", session.title, session.id);
    for message in &session.messages {
        println!("{}: {}", message.role.as_str(), message.text);
        if let Some(image) = &message.image {
            println!("   [doodle: {}]", image.mime_type);
        }
    }
}

pub fn new() {
    let mut store = SessionStore::open_default();
    let session = store.create();
    println!("Started {} ({})", session.title, session.id);
}

/// Resolves an id-or-title to a session id.
pub fn resolve_id(store: &SessionStore, key: &str) -> Result<String> {
    store
        .find(key)
        .map(|session| session.id.clone())
        .with_context(|| format!("No scribble matching '{key}'"))
}

pub fn select(key: &str) -> Result<()> {
    let mut store = SessionStore::open_default();
    let id = resolve_id(&store, key)?;
    let session = store.select(&id)?;
    println!("Switched to {} ({})", session.title, session.id);
    Ok(())
}

pub fn rename(key: &str, title: &str) -> Result<()> {
    let mut store = SessionStore::open_default();
    let id = resolve_id(&store, key)?;
    store
        .rename(&id, title)
        .with_context(|| format!("rename scribble '{id}'"))?;
    println!("Renamed {id} → {}", title.trim());
    Ok(())
}

pub fn delete(key: &str) -> Result<()> {
    let mut store = SessionStore::open_default();
    let id = resolve_id(&store, key)?;
    store.delete(&id);
    println!("Deleted {id}");

    let active = store.ensure_active();
    println!("Active: {} ({})", active.title, active.id);
    Ok(())
}
