pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod quantization;
pub mod telemetry;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::LmError;
pub use model::{
    ExecutionPlan, GenerationRequest, GenerationResult, LoadRequest, ModelSource, TorchBackend,
    format_prompt, generate, load,
};
