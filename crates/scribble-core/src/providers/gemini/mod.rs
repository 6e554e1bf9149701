//! Gemini provider (Generative Language API).

mod api;
mod sse;

pub use api::{GeminiClient, GeminiConfig};
pub use sse::GeminiSseParser;
