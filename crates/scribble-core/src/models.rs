//! Gemini model catalog offered by the settings surface.

/// Model used when nothing is configured.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Model forced by an explicit doodle request.
pub const DOODLE_MODEL: &str = "gemini-2.5-flash-image";

/// A selectable model with display metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

const MODELS: &[ModelOption] = &[
    ModelOption {
        id: "gemini-3-flash-preview",
        label: "Gemini 3 Flash (Smartest)",
        description: "Best for general chatting and reasoning.",
    },
    ModelOption {
        id: "gemini-3-pro-preview",
        label: "Gemini 3 Pro (Deep Thinking)",
        description: "Slower but more complex reasoning.",
    },
    ModelOption {
        id: "gemini-2.5-flash-latest",
        label: "Gemini 2.5 Flash (Fast)",
        description: "Quick and reliable responses.",
    },
    ModelOption {
        id: "gemini-2.5-flash-lite-latest",
        label: "Gemini 2.5 Flash Lite",
        description: "Lightweight and very snappy.",
    },
    ModelOption {
        id: "gemini-2.5-flash-image",
        label: "Nano Banana Doodle",
        description: "Image generation.",
    },
    ModelOption {
        id: "gemini-3-pro-image-preview",
        label: "Nano Banana Pro",
        description: "Higher quality image generation.",
    },
];

impl ModelOption {
    /// Returns all known models in display order.
    pub fn all() -> &'static [ModelOption] {
        MODELS
    }

    /// Looks up a known model by id.
    pub fn find_by_id(id: &str) -> Option<&'static ModelOption> {
        let id = id.trim();
        MODELS.iter().find(|model| model.id == id)
    }

    pub fn is_image_model(&self) -> bool {
        is_image_model(self.id)
    }
}

/// Returns true when the model id names an image-capable model.
///
/// Unknown ids are classified by name alone.
pub fn is_image_model(model: &str) -> bool {
    model.contains("image")
}
