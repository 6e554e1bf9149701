//! Generation API seam and the Gemini implementation.

pub mod gemini;
pub mod shared;

pub use shared::{
    FragmentStream, GenerationApi, GenerationError, GenerationErrorKind, GenerationResult,
    HistoryTurn, ImageReply, ImageRequest, TextRequest,
};
