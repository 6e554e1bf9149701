//! One user/model exchange against the active session.
//!
//! `run_exchange` validates the submission, writes the user message and a
//! model placeholder, dispatches to the backend and applies the reply.
//! Progress is reported to an optional renderer through an mpsc channel.

use std::fmt;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::appender::{Appender, ExchangeState};
use crate::config::Preferences;
use crate::dispatch::{self, Dispatched, GenerationMode};
use crate::providers::{GenerationApi, GenerationError, GenerationErrorKind};
use crate::sessions::{InlineImage, Message, SessionStore};

/// Text shown while a reply is pending.
pub const IN_PROGRESS_TEXT: &str = "scribbling in a notebook...";

/// Instruction shown when a send is refused for lack of a credential.
pub const MISSING_CREDENTIAL_TEXT: &str =
    "No Gemini API key found. Please scribble your token in settings first!";

/// Reasons a send is refused before anything is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    MissingCredential,
    EmptyPrompt,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::MissingCredential => write!(f, "{MISSING_CREDENTIAL_TEXT}"),
            SendError::EmptyPrompt => write!(f, "Nothing to send: the prompt is empty"),
        }
    }
}

impl std::error::Error for SendError {}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub prompt: String,
    /// Route through the image path regardless of the configured model.
    pub force_image: bool,
}

impl Submission {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            force_image: false,
        }
    }

    pub fn doodle(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            force_image: true,
        }
    }
}

/// Progress notifications for a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The request was dispatched; a reply is pending.
    Started { mode: GenerationMode },
    /// A streamed fragment arrived.
    Fragment { text: String },
    /// The reply is final.
    Completed {
        text: String,
        image: Option<InlineImage>,
    },
    /// The reply failed; `message` is the apology now in the session.
    Failed {
        kind: GenerationErrorKind,
        message: String,
    },
}

pub type ExchangeEventSender = mpsc::UnboundedSender<ExchangeEvent>;
pub type ExchangeEventReceiver = mpsc::UnboundedReceiver<ExchangeEvent>;

/// Creates a channel for exchange events.
///
/// Unbounded: the exchange never waits on its renderer, so the receiver may
/// be drained concurrently or after `run_exchange` returns.
pub fn create_event_channel() -> (ExchangeEventSender, ExchangeEventReceiver) {
    mpsc::unbounded_channel()
}

/// Final result of an exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub session_id: String,
    pub mode: GenerationMode,
    pub state: ExchangeState,
    /// The last message of the session after the exchange.
    pub reply: Message,
    /// The backend error, when the exchange ended with an apology.
    pub error: Option<GenerationError>,
}

impl ExchangeOutcome {
    pub fn is_error(&self) -> bool {
        self.state == ExchangeState::ErrorFinalized
    }
}

fn emit(events: Option<&ExchangeEventSender>, event: ExchangeEvent) {
    if let Some(tx) = events {
        // A gone renderer must not stop the exchange.
        let _ = tx.send(event);
    }
}

/// Runs one exchange against the active session (created if none exists).
///
/// # Errors
/// Returns a `SendError` when the submission is refused. Nothing is sent and
/// no session is touched in that case. Backend failures are not errors: they
/// end the exchange with an apology message.
pub async fn run_exchange<A: GenerationApi>(
    api: &A,
    store: &mut SessionStore,
    preferences: &Preferences,
    submission: Submission,
    events: Option<&ExchangeEventSender>,
) -> Result<ExchangeOutcome, SendError> {
    if preferences.credential().is_none() {
        return Err(SendError::MissingCredential);
    }
    let prompt = submission.prompt.trim();
    if prompt.is_empty() {
        return Err(SendError::EmptyPrompt);
    }

    let route = dispatch::route(&preferences.model, submission.force_image);
    let session = store.ensure_active();
    let session_id = session.id.clone();
    let history = session.messages.clone();
    debug!(session = %session_id, mode = %route.mode, "starting exchange");

    let mut appender = Appender::new(store, session_id.clone());
    appender.append_user(prompt);
    appender.begin_model_reply();
    emit(events, ExchangeEvent::Started { mode: route.mode });

    let dispatched =
        dispatch::dispatch(api, &route, prompt, &history, &preferences.memory).await;

    let mut error = None;
    match dispatched {
        Ok(Dispatched::Fragments(mut fragments)) => {
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        appender.on_fragment(&fragment);
                        emit(events, ExchangeEvent::Fragment { text: fragment });
                    }
                    Err(err) => {
                        error = Some(err);
                        break;
                    }
                }
            }
            if error.is_none() {
                appender.complete_reply(None);
            }
        }
        Ok(Dispatched::Image(reply)) => {
            appender.on_fragment(&reply.text);
            appender.complete_reply(reply.image);
        }
        Err(err) => error = Some(err),
    }

    if let Some(err) = &error {
        warn!(kind = %err.kind, error = %err, "generation failed");
        appender.fail(err.apology());
        emit(
            events,
            ExchangeEvent::Failed {
                kind: err.kind,
                message: err.apology().to_string(),
            },
        );
    }

    let state = appender.state();
    let reply = appender
        .trailing()
        .cloned()
        .unwrap_or_else(|| Message::model(appender.body()));

    if error.is_none() {
        emit(
            events,
            ExchangeEvent::Completed {
                text: reply.text.clone(),
                image: reply.image.clone(),
            },
        );
    }

    Ok(ExchangeOutcome {
        session_id,
        mode: route.mode,
        state,
        reply,
        error,
    })
}
