//! Interactive chat command handler.
//!
//! A line-based REPL over the active scribble. Slash commands manage
//! sessions; anything else is sent as a message.

use std::io::{IsTerminal, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use scribble_core::config::Config;
use scribble_core::exchange::{MISSING_CREDENTIAL_TEXT, Submission};
use scribble_core::sessions::SessionStore;
use scribble_core::status::{STATUS_UNAVAILABLE, StatusClient, spawn_status_poller};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{send, sessions};

const HELP: &str = "\
commands:
  /doodle <prompt>   draw a doodle instead of answering
  /new               start a new scribble
  /list              list scribbles
  /switch <id>       switch to a scribble (id or title)
  /delete <id>       delete a scribble (id or title)
  /status            show the presence status
  /help              show this help
  /quit              leave";

/// A parsed line of input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Doodle(&'a str),
    New,
    List,
    Switch(&'a str),
    Delete(&'a str),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));
    match name {
        "doodle" => Input::Doodle(arg),
        "new" => Input::New,
        "list" => Input::List,
        "switch" => Input::Switch(arg),
        "delete" => Input::Delete(arg),
        "status" => Input::Status,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

pub async fn run(config: &Config) -> Result<()> {
    // If stdin is piped, send it as a single message instead
    if !std::io::stdin().is_terminal() {
        let mut prompt = String::new();
        std::io::stdin().lock().read_to_string(&mut prompt)?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            anyhow::bail!("No input provided via pipe");
        }
        return send::run(send::SendRunOptions {
            prompt,
            doodle: false,
            out: None,
            config,
        })
        .await;
    }

    let cancel = CancellationToken::new();
    let status = start_status_poller(config, &cancel);

    let result = repl(status.as_ref().map(|(rx, _)| rx)).await;

    cancel.cancel();
    if let Some((_, handle)) = status {
        let _ = handle.await;
    }
    result
}

fn start_status_poller(
    config: &Config,
    cancel: &CancellationToken,
) -> Option<(watch::Receiver<String>, tokio::task::JoinHandle<()>)> {
    match StatusClient::from_config(&config.status) {
        Ok(Some(client)) => Some(spawn_status_poller(
            client,
            config.status.interval(),
            cancel.clone(),
        )),
        Ok(None) => None,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "status poller disabled");
            None
        }
    }
}

async fn repl(status: Option<&watch::Receiver<String>>) -> Result<()> {
    let mut store = SessionStore::open_default();
    sessions::print_transcript(store.ensure_active());
    println!("(type /help for commands)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().context("flush stdout")?;

        let Some(line) = lines.next_line().await.context("read input")? else {
            println!();
            return Ok(());
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Message(prompt) => send_message(&mut store, Submission::text(prompt)).await?,
            Input::Doodle("") => println!("usage: /doodle <prompt>"),
            Input::Doodle(prompt) => send_message(&mut store, Submission::doodle(prompt)).await?,
            Input::New => {
                let session = store.create();
                println!("Started {} ({})", session.title, session.id);
                sessions::print_transcript(session);
            }
            Input::List => sessions::print_list(&store),
            Input::Switch(key) => match sessions::resolve_id(&store, key) {
                Ok(id) => {
                    let session = store.select(&id)?;
                    sessions::print_transcript(session);
                }
                Err(err) => println!("{err:#}"),
            },
            Input::Delete(key) => match sessions::resolve_id(&store, key) {
                Ok(id) => {
                    store.delete(&id);
                    println!("Deleted {id}");
                    let session = store.ensure_active();
                    println!("Active: {} ({})", session.title, session.id);
                }
                Err(err) => println!("{err:#}"),
            },
            Input::Status => match status {
                Some(rx) => println!("{}", rx.borrow().as_str()),
                None => println!("{STATUS_UNAVAILABLE}"),
            },
            Input::Help => println!("{HELP}"),
            Input::Quit => return Ok(()),
            Input::Unknown(name) => println!("unknown command /{name} (try /help)"),
        }
    }
}

async fn send_message(store: &mut SessionStore, submission: Submission) -> Result<()> {
    // Preferences are re-read so settings changes apply to the next message
    let config = Config::load().context("load config")?;
    let preferences = config.preferences();
    if preferences.credential().is_none() {
        println!("{MISSING_CREDENTIAL_TEXT}");
        return Ok(());
    }

    let client = send::gemini_client(&config, &preferences)?;
    let outcome = match send::send_rendered(&client, store, &preferences, submission).await {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("{err:#}");
            return Ok(());
        }
    };

    if let Some(image) = &outcome.reply.image {
        match send::save_doodle(Path::new("."), None, image) {
            Ok(path) => println!("doodle saved to {}", path.display()),
            Err(err) => println!("could not save doodle: {err:#}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_input("  hello there "), Input::Message("hello there"));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands_take_trimmed_arguments() {
        assert_eq!(parse_input("/doodle   a red fox "), Input::Doodle("a red fox"));
        assert_eq!(parse_input("/doodle"), Input::Doodle(""));
        assert_eq!(parse_input("/switch scribble 2"), Input::Switch("scribble 2"));
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/wat"), Input::Unknown("wat"));
    }
}
