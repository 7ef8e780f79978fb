mod generate;
mod loader;
mod plan;
mod prompt;
mod source;
mod tokenizer;
mod types;

pub use generate::{generate, sample_top_p};
pub use loader::{
    CausalLm, LoadOutcome, LoadedModel, ModelBackend, ScriptedLm, TorchBackend,
    classify_load_error, into_outcome, load, load_model_with_fallback,
};
pub use plan::{ExecutionPlan, LoadRequest, Placement, Precision, QuantizationConfig};
pub use prompt::{ChatFormat, ChatMessage, PromptStyle, Role};
pub use source::ModelSource;
pub use tokenizer::TokenizerHandle;
pub use types::{GenerationRequest, GenerationResult, ModelMetadata};

/// Applies the tokenizer's chat format when it has one, otherwise returns the
/// message unchanged.
pub fn format_prompt(tokenizer: &TokenizerHandle, user_message: &str) -> String {
    tokenizer.format_prompt(user_message)
}

/// Like [`format_prompt`], with an optional system message ahead of the user turn.
pub fn format_with_system(
    tokenizer: &TokenizerHandle,
    system: Option<&str>,
    user_message: &str,
) -> String {
    match system {
        Some(system) => tokenizer
            .format_conversation(&[ChatMessage::system(system), ChatMessage::user(user_message)]),
        None => tokenizer.format_prompt(user_message),
    }
}
