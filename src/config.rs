use std::{env, path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model_file: String,
    pub tokenizer_file: String,
    pub revision: Option<String>,
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub quant_group_size: usize,
    pub nvidia_smi_path: PathBuf,
    pub gpu_query_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_file: "model.ts".to_string(),
            tokenizer_file: "tokenizer.json".to_string(),
            revision: None,
            max_new_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
            quant_group_size: 64,
            nvidia_smi_path: PathBuf::from("nvidia-smi"),
            gpu_query_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let model_file = env::var("MODEL_FILE").unwrap_or(defaults.model_file);
        let tokenizer_file = env::var("TOKENIZER_FILE").unwrap_or(defaults.tokenizer_file);
        let revision = env::var("MODEL_REVISION").ok();

        let max_new_tokens = env::var("MAX_NEW_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_new_tokens);
        let temperature = env::var("TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.temperature);
        let top_p = env::var("TOP_P")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.top_p);
        let quant_group_size = env::var("QUANT_GROUP_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&size: &usize| size > 0)
            .unwrap_or(defaults.quant_group_size);

        let nvidia_smi_path = env::var("NVIDIA_SMI_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.nvidia_smi_path);
        let gpu_query_timeout = env::var("GPU_QUERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.gpu_query_timeout);

        Ok(Self {
            model_file,
            tokenizer_file,
            revision,
            max_new_tokens,
            temperature,
            top_p,
            quant_group_size,
            nvidia_smi_path,
            gpu_query_timeout,
        })
    }
}
