//! Provider-agnostic types shared by generation backends.

use std::fmt;
use std::future::Future;

use anyhow::{Context, Result};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sessions::{InlineImage, Role};

/// Standard User-Agent header for scribble API requests.
pub const USER_AGENT: &str = concat!("scribble/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Config resolution helpers
// ============================================================================

/// Resolves an API key with precedence: config > env.
///
/// Blank values count as missing. Returns `None` when no key is available so
/// callers can refuse to start a request.
pub fn resolve_api_key(config_api_key: Option<&str>, env_var: &str) -> Option<String> {
    if let Some(key) = config_api_key {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    std::env::var(env_var)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the chosen URL is malformed.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    provider_name: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(default_url.to_string())
}

/// Validates that a URL is well-formed.
fn validate_url(url: &str, provider_name: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {provider_name} base URL: {url}"))?;
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

/// Categories of generation failures, each with fixed user-facing copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    /// Rate limit or quota exhausted
    QuotaExhausted,
    /// Credential rejected by the API
    InvalidCredential,
    /// Model unknown or not available for the credential
    ModelUnavailable,
    /// Anything else (network, parse, server errors)
    Other,
}

impl GenerationErrorKind {
    /// Classifies raw error text from the API or transport.
    pub fn classify(text: &str) -> Self {
        if text.contains("429") || text.contains("RESOURCE_EXHAUSTED") {
            GenerationErrorKind::QuotaExhausted
        } else if text.contains("API key not valid") || text.contains("API_KEY_INVALID") {
            GenerationErrorKind::InvalidCredential
        } else if text.contains("model") && text.contains("not found") {
            GenerationErrorKind::ModelUnavailable
        } else {
            GenerationErrorKind::Other
        }
    }

    /// Apology shown in place of a model reply.
    pub fn apology(self) -> &'static str {
        match self {
            GenerationErrorKind::QuotaExhausted => {
                "uh oh! i ran out of graphite (quota limit reached). please wait a bit before doodling more!"
            }
            GenerationErrorKind::InvalidCredential => {
                "uh oh, your token seems wrong. double check it in settings!"
            }
            GenerationErrorKind::ModelUnavailable => {
                "uh oh, that brain model is not available for your token! try changing it in settings."
            }
            GenerationErrorKind::Other => "oops... lead broke. try again!",
        }
    }
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationErrorKind::QuotaExhausted => write!(f, "quota_exhausted"),
            GenerationErrorKind::InvalidCredential => write!(f, "invalid_credential"),
            GenerationErrorKind::ModelUnavailable => write!(f, "model_unavailable"),
            GenerationErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Structured error from a generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationError {
    /// Error category
    pub kind: GenerationErrorKind,
    /// One-line summary suitable for logs
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an error whose kind is derived from its text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: GenerationErrorKind::classify(&message),
            message,
            details: None,
        }
    }

    /// Creates an error from a non-success HTTP response.
    pub fn http_status(status: u16, body: &str) -> Self {
        let mut message = format!("HTTP {status}");
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(error_obj) = json.get("error")
        {
            if let Some(code) = error_obj.get("status").and_then(Value::as_str) {
                message = format!("{message} {code}");
            }
            if let Some(msg) = error_obj.get("message").and_then(Value::as_str) {
                message = format!("{message}: {msg}");
            }
        }

        let details = (!body.is_empty()).then(|| body.to_string());
        let kind = GenerationErrorKind::classify(&format!("{message} {body}"));
        Self {
            kind,
            message,
            details,
        }
    }

    /// Apology shown in place of a model reply.
    pub fn apology(&self) -> &'static str {
        self.kind.apology()
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Result type for generation operations.
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

// ============================================================================
// Requests
// ============================================================================

/// A prior turn sent as conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// Streaming text-generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub model: String,
    pub system_instruction: String,
    pub history: Vec<HistoryTurn>,
    pub prompt: String,
}

/// Single-shot image-generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    /// Output aspect ratio (e.g. "1:1").
    pub aspect_ratio: Option<String>,
}

/// Response of an image-generation request. Both parts may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReply {
    pub text: String,
    pub image: Option<InlineImage>,
}

/// Boxed stream of text fragments in arrival order.
pub type FragmentStream = BoxStream<'static, GenerationResult<String>>;

/// The external generation API.
pub trait GenerationApi {
    /// Starts a streamed text reply.
    fn stream_text(
        &self,
        request: TextRequest,
    ) -> impl Future<Output = GenerationResult<FragmentStream>> + Send;

    /// Requests a single image artifact (plus optional text).
    fn generate_image(
        &self,
        request: ImageRequest,
    ) -> impl Future<Output = GenerationResult<ImageReply>> + Send;
}
