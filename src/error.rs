use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("quantization error: {0}")]
    Quantization(String),
    #[error("accelerator cannot run this model: {0}")]
    HardwareMismatch(String),
    #[error("failed to load model `{model_id}`: {source}")]
    ModelLoad {
        model_id: String,
        #[source]
        source: Box<LmError>,
    },
    #[error("model hub error: {0}")]
    Hub(String),
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

impl LmError {
    pub fn model_load(model_id: impl Into<String>, source: LmError) -> Self {
        LmError::ModelLoad {
            model_id: model_id.into(),
            source: Box::new(source),
        }
    }
}
