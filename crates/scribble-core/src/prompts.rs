//! Prompt file helpers.

/// Persona template for text-mode system instructions.
///
/// `{{MEMORY}}` is replaced with the user's memory note.
pub const PERSONA_PROMPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/persona.md"));

/// Substituted for the memory note when the user has not written one.
pub const EMPTY_MEMORY_PLACEHOLDER: &str = "nothing known yet.";

/// Builds the system instruction for a text-mode request.
pub fn build_system_instruction(memory: &str) -> String {
    let memory = memory.trim();
    let memory = if memory.is_empty() {
        EMPTY_MEMORY_PLACEHOLDER
    } else {
        memory
    };
    PERSONA_PROMPT_TEMPLATE
        .trim_end()
        .replace("{{MEMORY}}", memory)
}
