//! Model dispatch: picks the text or image path for a prompt.
//!
//! Image mode is used when the caller forces a doodle or when the configured
//! model is image-capable. Exactly one backend call is made per dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{self, DOODLE_MODEL};
use crate::prompts::build_system_instruction;
use crate::providers::{
    FragmentStream, GenerationApi, GenerationResult, HistoryTurn, ImageReply, ImageRequest,
    TextRequest,
};
use crate::sessions::Message;

/// Aspect ratio requested for every doodle.
pub const DOODLE_ASPECT_RATIO: &str = "1:1";

const FORCED_DOODLE_TEXT: &str = "meow! i doodled this for u!";
const DOODLE_TEXT: &str = "here is your doodle!";

/// Which backend path serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Text,
    Image,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::Text => write!(f, "text"),
            GenerationMode::Image => write!(f, "image"),
        }
    }
}

/// The resolved mode and model for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub mode: GenerationMode,
    pub model: String,
    /// True when the image path was requested explicitly.
    pub forced: bool,
}

/// Selects exactly one mode for a request.
pub fn route(preferred_model: &str, force_image: bool) -> Route {
    if force_image {
        return Route {
            mode: GenerationMode::Image,
            model: DOODLE_MODEL.to_string(),
            forced: true,
        };
    }

    let mode = if models::is_image_model(preferred_model) {
        GenerationMode::Image
    } else {
        GenerationMode::Text
    };
    Route {
        mode,
        model: preferred_model.to_string(),
        forced: false,
    }
}

/// Converts prior session messages into text-only history turns.
pub fn history_from(messages: &[Message]) -> Vec<HistoryTurn> {
    messages
        .iter()
        .filter(|message| !message.text.trim().is_empty())
        .map(|message| HistoryTurn {
            role: message.role,
            text: message.text.clone(),
        })
        .collect()
}

/// Reply text used when an image response carries no text.
pub fn image_fallback_text(forced: bool) -> &'static str {
    if forced { FORCED_DOODLE_TEXT } else { DOODLE_TEXT }
}

/// Result of a dispatched request.
pub enum Dispatched {
    /// Streamed text fragments, in arrival order.
    Fragments(FragmentStream),
    /// A completed image reply with non-empty text.
    Image(ImageReply),
}

/// Sends one request along `route`.
///
/// # Errors
/// Returns the classified backend error if the request could not be started.
pub async fn dispatch<A: GenerationApi>(
    api: &A,
    route: &Route,
    prompt: &str,
    history: &[Message],
    memory: &str,
) -> GenerationResult<Dispatched> {
    debug!(mode = %route.mode, model = %route.model, "dispatching request");

    match route.mode {
        GenerationMode::Text => {
            let request = TextRequest {
                model: route.model.clone(),
                system_instruction: build_system_instruction(memory),
                history: history_from(history),
                prompt: prompt.to_string(),
            };
            let fragments = api.stream_text(request).await?;
            Ok(Dispatched::Fragments(fragments))
        }
        GenerationMode::Image => {
            let request = ImageRequest {
                model: route.model.clone(),
                prompt: prompt.to_string(),
                aspect_ratio: Some(DOODLE_ASPECT_RATIO.to_string()),
            };
            let mut reply = api.generate_image(request).await?;
            if reply.text.trim().is_empty() {
                reply.text = image_fallback_text(route.forced).to_string();
            }
            Ok(Dispatched::Image(reply))
        }
    }
}
