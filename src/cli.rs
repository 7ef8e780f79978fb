use clap::Parser;

use crate::{
    config::AppConfig,
    model::{GenerationRequest, LoadRequest},
};

/// Sampled text generation against a TorchScript causal language model.
#[derive(Debug, Parser)]
#[command(name = "causal-lm", version)]
pub struct Cli {
    /// Model identifier: a local directory or a hub repository id.
    #[arg(long)]
    pub model: String,

    /// User message to generate a response for.
    #[arg(long)]
    pub prompt: String,

    /// Optional system message placed before the user turn.
    #[arg(long)]
    pub system: Option<String>,

    /// Quantize weights to 4 bits after loading.
    #[arg(long)]
    pub q4: bool,

    /// Force CPU execution (for CUDA compatibility issues).
    #[arg(long)]
    pub cpu: bool,

    /// Upper bound on generated tokens.
    #[arg(long = "max_new_tokens")]
    pub max_new_tokens: Option<usize>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling mass.
    #[arg(long = "top_p")]
    pub top_p: Option<f64>,
}

impl Cli {
    pub fn load_request(&self) -> LoadRequest {
        LoadRequest {
            model_id: self.model.clone(),
            quantize_4bit: self.q4,
            force_cpu: self.cpu,
        }
    }

    /// Flags win over environment defaults.
    pub fn generation_request(&self, prompt: String, config: &AppConfig) -> GenerationRequest {
        GenerationRequest {
            prompt,
            max_new_tokens: self.max_new_tokens.unwrap_or(config.max_new_tokens),
            temperature: self.temperature.unwrap_or(config.temperature),
            top_p: self.top_p.unwrap_or(config.top_p),
        }
    }
}
