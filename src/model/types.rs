use crate::error::LmError;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), LmError> {
        if self.max_new_tokens == 0 {
            return Err(LmError::BadRequest("max_new_tokens must be > 0".into()));
        }
        if !(self.temperature > 0.0) || !self.temperature.is_finite() {
            return Err(LmError::BadRequest(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(LmError::BadRequest(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

/// `text` is the whole decoded sequence, so it starts with the prompt.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub prompt_tokens: usize,
    pub tokens_generated: usize,
    pub total_time_ms: u128,
    pub tokens_per_second: f64,
}

#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub model_id: String,
    pub dtype: String,
    pub device: String,
    pub quantized: bool,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max_new_tokens: usize, temperature: f64, top_p: f64) -> GenerationRequest {
        GenerationRequest {
            prompt: "hello".into(),
            max_new_tokens,
            temperature,
            top_p,
        }
    }

    #[test]
    fn accepts_defaults() {
        assert!(request(256, 0.7, 0.9).validate().is_ok());
        assert!(request(1, 0.01, 1.0).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        for bad in [
            request(0, 0.7, 0.9),
            request(8, 0.0, 0.9),
            request(8, f64::NAN, 0.9),
            request(8, 0.7, 0.0),
            request(8, 0.7, 1.5),
        ] {
            assert!(matches!(bad.validate(), Err(LmError::BadRequest(_))));
        }
    }
}
