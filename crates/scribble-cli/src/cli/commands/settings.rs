//! Settings command handlers.
//!
//! Every write goes straight to config.toml; no format validation is done.

use anyhow::{Context, Result};
use scribble_core::config::{self, Config, PreferenceField};
use scribble_core::models::ModelOption;

pub fn show(config: &Config) {
    let preferences = config.preferences();

    let label = ModelOption::find_by_id(&preferences.model)
        .map_or("custom model", |model| model.label);
    println!("model:  {} ({label})", preferences.model);

    match preferences.credential() {
        Some(key) => println!("token:  {}", mask(key)),
        None => println!("token:  not set"),
    }

    if preferences.memory.trim().is_empty() {
        println!("memory: (empty)");
    } else {
        println!("memory: {}", preferences.memory);
    }
}

fn mask(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let visible: String = key.chars().skip(count - 4).collect();
    format!("****{visible}")
}

fn save(field: PreferenceField, value: &str) -> Result<()> {
    Config::save_field(field, value).with_context(|| {
        format!(
            "save {} to {}",
            field.key(),
            config::paths::config_path().display()
        )
    })
}

pub fn set_token(token: &str) -> Result<()> {
    save(PreferenceField::ApiKey, token)?;
    if token.trim().is_empty() {
        println!("Token cleared.");
    } else {
        println!("Token saved.");
    }
    Ok(())
}

pub fn set_model(model: &str) -> Result<()> {
    let model = model.trim();
    if model.is_empty() {
        anyhow::bail!("Model id cannot be empty");
    }
    save(PreferenceField::Model, model)?;

    match ModelOption::find_by_id(model) {
        Some(option) => println!("Model set to {} ({})", option.id, option.label),
        None => println!("Model set to {model} (not in the known list)"),
    }
    Ok(())
}

pub fn set_memory(memory: &str) -> Result<()> {
    save(PreferenceField::Memory, memory)?;
    println!("Memory saved.");
    Ok(())
}

pub fn models(config: &Config) {
    let current = config.preferences().model;
    for model in ModelOption::all() {
        let marker = if model.id == current { "*" } else { " " };
        let kind = if model.is_image_model() {
            "doodle"
        } else {
            "text"
        };
        println!(
            "{marker} {:<30} {:<30} [{kind}] {}",
            model.id, model.label, model.description
        );
    }
}
