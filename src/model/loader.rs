use std::fs;

use tch::{CModule, Device, IValue, Kind, TchError, Tensor, no_grad};
use tracing::info;

use crate::{
    error::LmError,
    model::{ModelMetadata, plan::ExecutionPlan, source::ModelSource, tokenizer::TokenizerHandle},
    quantization::{QuantizationSummary, is_float_kind, quantize_parameters},
};

/// libtorch messages that mean the accelerator cannot run the model's kernels.
const HARDWARE_MISMATCH_SIGNATURES: [&str; 2] = ["CUDA error", "no kernel image"];

/// A causal language model producing next-token logits.
pub trait CausalLm {
    fn device(&self) -> Device;

    /// `input_ids` is `[1, seq_len]`; returns logits `[1, seq_len, vocab]`.
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor, LmError>;
}

/// Outcome of a single load attempt.
pub enum LoadOutcome<M> {
    Loaded(M),
    /// The accelerator rejected the model; a CPU retry may succeed.
    HardwareMismatch(String),
    Fatal(LmError),
}

pub trait ModelBackend {
    type Model: CausalLm;

    fn gpu_available(&self) -> bool;

    fn load_model(&self, source: &ModelSource, plan: &ExecutionPlan) -> LoadOutcome<Self::Model>;
}

pub struct LoadedModel<M> {
    pub tokenizer: TokenizerHandle,
    pub model: M,
    /// The plan the model was actually loaded with.
    pub plan: ExecutionPlan,
}

/// Loads tokenizer and model, retrying once on CPU at full precision if the
/// accelerator rejects the model.
pub fn load<B: ModelBackend>(
    backend: &B,
    source: &ModelSource,
    plan: ExecutionPlan,
) -> Result<LoadedModel<B::Model>, LmError> {
    let tokenizer = TokenizerHandle::from_source(source)
        .map_err(|e| LmError::model_load(&source.model_id, e))?;
    let (model, plan) = load_model_with_fallback(backend, source, plan)?;
    Ok(LoadedModel {
        tokenizer,
        model,
        plan,
    })
}

pub fn load_model_with_fallback<B: ModelBackend>(
    backend: &B,
    source: &ModelSource,
    plan: ExecutionPlan,
) -> Result<(B::Model, ExecutionPlan), LmError> {
    info!(model_id = %source.model_id, ?plan, "loading model");
    match backend.load_model(source, &plan) {
        LoadOutcome::Loaded(model) => Ok((model, plan)),
        LoadOutcome::Fatal(err) => Err(LmError::model_load(&source.model_id, err)),
        LoadOutcome::HardwareMismatch(reason) => {
            info!(%reason, "CUDA compatibility issue detected, retrying on CPU");
            let fallback = plan.cpu_fallback();
            match backend.load_model(source, &fallback) {
                LoadOutcome::Loaded(model) => Ok((model, fallback)),
                LoadOutcome::HardwareMismatch(reason) => Err(LmError::model_load(
                    &source.model_id,
                    LmError::HardwareMismatch(reason),
                )),
                LoadOutcome::Fatal(err) => Err(LmError::model_load(&source.model_id, err)),
            }
        }
    }
}

pub fn classify_load_error<M>(err: TchError) -> LoadOutcome<M> {
    let message = err.to_string();
    if HARDWARE_MISMATCH_SIGNATURES
        .iter()
        .any(|sig| message.contains(sig))
    {
        LoadOutcome::HardwareMismatch(message)
    } else {
        LoadOutcome::Fatal(LmError::Torch(err))
    }
}

/// Any libtorch failure from any load stage goes through the classifier.
pub fn into_outcome<M>(result: Result<M, LmError>) -> LoadOutcome<M> {
    match result {
        Ok(model) => LoadOutcome::Loaded(model),
        Err(LmError::Torch(err)) => classify_load_error(err),
        Err(err) => LoadOutcome::Fatal(err),
    }
}

/// Moves every parameter to `device`, casting floating-point ones to `kind`.
fn cast_parameters(module: &CModule, device: Device, kind: Kind) -> Result<(), LmError> {
    no_grad(|| {
        for (_, mut param) in module.named_parameters()? {
            let target = if is_float_kind(param.kind()) { kind } else { param.kind() };
            let moved = param.f_to_device_(device, target, false, false)?;
            param.f_set_data(&moved)?;
        }
        Ok::<(), LmError>(())
    })
}

/// Loads TorchScript modules through libtorch.
pub struct TorchBackend;

impl ModelBackend for TorchBackend {
    type Model = ScriptedLm;

    fn gpu_available(&self) -> bool {
        tch::Cuda::is_available()
    }

    fn load_model(&self, source: &ModelSource, plan: &ExecutionPlan) -> LoadOutcome<ScriptedLm> {
        into_outcome(ScriptedLm::load(source, plan))
    }
}

pub struct ScriptedLm {
    model_id: String,
    kind: Kind,
    size_bytes: u64,
    device: Device,
    quantization: Option<QuantizationSummary>,
    module: CModule,
}

impl ScriptedLm {
    pub fn load(source: &ModelSource, plan: &ExecutionPlan) -> Result<Self, LmError> {
        let size_bytes = fs::metadata(&source.model_path)?.len();
        // Map straight onto the target device so weights never stage in host memory twice.
        let mut module = CModule::load_on_device(&source.model_path, plan.device)?;
        module.f_set_eval()?;
        // First kernel launches happen here; failures must stay recoverable.
        cast_parameters(&module, plan.device, plan.precision.kind())?;

        let quantization = match &plan.quantization {
            Some(config) => {
                let summary = quantize_parameters(module.named_parameters()?, config)?;
                info!(
                    tensors = summary.tensors_quantized,
                    reduction_percent = summary.size_reduction_percent,
                    "weights quantized to {} bits",
                    config.bits
                );
                Some(summary)
            }
            None => None,
        };

        Ok(Self {
            model_id: source.model_id.clone(),
            kind: plan.precision.kind(),
            size_bytes,
            device: plan.device,
            quantization,
            module,
        })
    }

    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_id: self.model_id.clone(),
            dtype: format!("{:?}", self.kind),
            device: format!("{:?}", self.device),
            quantized: self.quantization.is_some(),
            size_bytes: self.size_bytes,
        }
    }
}

impl CausalLm for ScriptedLm {
    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor, LmError> {
        let output = self
            .module
            .forward_is(&[IValue::Tensor(input_ids.shallow_clone())])?;
        logits_from_output(output)
    }
}

/// Traced models return either logits or a tuple led by logits.
fn logits_from_output(output: IValue) -> Result<Tensor, LmError> {
    match output {
        IValue::Tensor(t) => Ok(t),
        IValue::Tuple(mut tuple) if !tuple.is_empty() => match tuple.swap_remove(0) {
            IValue::Tensor(t) => Ok(t),
            _ => Err(LmError::Inference(
                "expected tensor as first tuple element".into(),
            )),
        },
        _ => Err(LmError::Inference("unexpected model output format".into())),
    }
}
