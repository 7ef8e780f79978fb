use std::path::{Path, PathBuf};

use tracing::info;

use crate::{config::AppConfig, error::LmError};

pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// Local paths of the artifacts a model identifier resolves to.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub model_id: String,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub tokenizer_config_path: Option<PathBuf>,
}

impl ModelSource {
    /// A directory on disk wins over a hub lookup.
    pub fn resolve(model_id: &str, config: &AppConfig) -> Result<Self, LmError> {
        let dir = Path::new(model_id);
        if dir.is_dir() {
            return Self::from_dir(model_id, dir, config);
        }
        Self::from_hub(model_id, config)
    }

    pub fn from_dir(model_id: &str, dir: &Path, config: &AppConfig) -> Result<Self, LmError> {
        let model_path = dir.join(&config.model_file);
        let tokenizer_path = dir.join(&config.tokenizer_file);
        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(LmError::Other(format!(
                    "model artifact missing: {}",
                    path.display()
                )));
            }
        }
        let tokenizer_config_path = Some(dir.join(TOKENIZER_CONFIG_FILE)).filter(|p| p.exists());

        Ok(Self {
            model_id: model_id.to_string(),
            model_path,
            tokenizer_path,
            tokenizer_config_path,
        })
    }

    #[cfg(feature = "hub")]
    fn from_hub(model_id: &str, config: &AppConfig) -> Result<Self, LmError> {
        use hf_hub::{Repo, RepoType, api::sync::Api};

        info!(model_id, revision = ?config.revision, "fetching model artifacts from hub");
        let api = Api::new().map_err(|e| LmError::Hub(e.to_string()))?;
        let repo = match &config.revision {
            Some(revision) => api.repo(Repo::with_revision(
                model_id.to_string(),
                RepoType::Model,
                revision.clone(),
            )),
            None => api.model(model_id.to_string()),
        };

        let model_path = repo
            .get(&config.model_file)
            .map_err(|e| LmError::Hub(format!("{}: {e}", config.model_file)))?;
        let tokenizer_path = repo
            .get(&config.tokenizer_file)
            .map_err(|e| LmError::Hub(format!("{}: {e}", config.tokenizer_file)))?;
        let tokenizer_config_path = repo.get(TOKENIZER_CONFIG_FILE).ok();

        Ok(Self {
            model_id: model_id.to_string(),
            model_path,
            tokenizer_path,
            tokenizer_config_path,
        })
    }

    #[cfg(not(feature = "hub"))]
    fn from_hub(model_id: &str, _config: &AppConfig) -> Result<Self, LmError> {
        info!(model_id, "hub support disabled");
        Err(LmError::Other(format!(
            "`{model_id}` is not a local directory and hub support is disabled"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn local_directory_resolves_without_optional_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.ts"), b"stub").unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let id = dir.path().to_str().unwrap();
        let source = ModelSource::resolve(id, &AppConfig::default()).unwrap();
        assert_eq!(source.model_path, dir.path().join("model.ts"));
        assert!(source.tokenizer_config_path.is_none());
    }

    #[test]
    fn local_directory_missing_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let err = ModelSource::from_dir("local", dir.path(), &AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("model artifact missing"));
    }
}
