//! Execution plan resolution: which precision, placement and quantization a
//! load should use, derived from the request and the hardware that is present.

use tch::{Device, Kind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub model_id: String,
    pub quantize_4bit: bool,
    pub force_cpu: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// bfloat16, only chosen when an accelerator will actually be used.
    Reduced,
    Full,
}

impl Precision {
    pub fn kind(self) -> Kind {
        match self {
            Precision::Reduced => Kind::BFloat16,
            Precision::Full => Kind::Float,
        }
    }

    pub fn bytes_per_element(self) -> u64 {
        match self {
            Precision::Reduced => 2,
            Precision::Full => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Let the runtime put the weights on whatever accelerator exists.
    Auto,
    CpuOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizationConfig {
    pub bits: u8,
    pub group_size: usize,
    pub compute_precision: Precision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub precision: Precision,
    pub placement: Placement,
    pub device: Device,
    pub quantization: Option<QuantizationConfig>,
}

impl ExecutionPlan {
    pub fn resolve(request: &LoadRequest, gpu_available: bool, group_size: usize) -> Self {
        let precision = if gpu_available && !request.force_cpu {
            Precision::Reduced
        } else {
            Precision::Full
        };
        let placement = if request.force_cpu {
            Placement::CpuOnly
        } else {
            Placement::Auto
        };
        let device = match placement {
            Placement::Auto if gpu_available => Device::Cuda(0),
            _ => Device::Cpu,
        };
        let quantization = request.quantize_4bit.then_some(QuantizationConfig {
            bits: 4,
            group_size,
            compute_precision: precision,
        });

        Self {
            precision,
            placement,
            device,
            quantization,
        }
    }

    /// Plan used for the single retry after an accelerator rejected the model.
    pub fn cpu_fallback(&self) -> Self {
        Self {
            precision: Precision::Full,
            placement: Placement::CpuOnly,
            device: Device::Cpu,
            quantization: self.quantization.map(|q| QuantizationConfig {
                compute_precision: Precision::Full,
                ..q
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantize_4bit: bool, force_cpu: bool) -> LoadRequest {
        LoadRequest {
            model_id: "tiny".into(),
            quantize_4bit,
            force_cpu,
        }
    }

    #[test]
    fn no_gpu_keeps_auto_placement_with_full_precision() {
        let plan = ExecutionPlan::resolve(&request(false, false), false, 64);
        assert_eq!(plan.precision, Precision::Full);
        assert_eq!(plan.placement, Placement::Auto);
        assert_eq!(plan.device, Device::Cpu);
        assert!(plan.quantization.is_none());
    }

    #[test]
    fn gpu_selects_reduced_precision() {
        let plan = ExecutionPlan::resolve(&request(false, false), true, 64);
        assert_eq!(plan.precision, Precision::Reduced);
        assert_eq!(plan.placement, Placement::Auto);
        assert_eq!(plan.device, Device::Cuda(0));
    }

    #[test]
    fn force_cpu_overrides_gpu() {
        let plan = ExecutionPlan::resolve(&request(false, true), true, 64);
        assert_eq!(plan.precision, Precision::Full);
        assert_eq!(plan.placement, Placement::CpuOnly);
        assert_eq!(plan.device, Device::Cpu);
    }

    #[test]
    fn quantization_carries_resolved_precision() {
        let plan = ExecutionPlan::resolve(&request(true, false), true, 32);
        let quant = plan.quantization.expect("quantization requested");
        assert_eq!(quant.bits, 4);
        assert_eq!(quant.group_size, 32);
        assert_eq!(quant.compute_precision, Precision::Reduced);
    }

    #[test]
    fn quantized_cpu_request_still_resolves() {
        let plan = ExecutionPlan::resolve(&request(true, true), true, 64);
        assert_eq!(plan.placement, Placement::CpuOnly);
        assert_eq!(
            plan.quantization.map(|q| q.compute_precision),
            Some(Precision::Full)
        );
    }

    #[test]
    fn fallback_forces_cpu_and_full_precision() {
        let plan = ExecutionPlan::resolve(&request(true, false), true, 64);
        let fallback = plan.cpu_fallback();
        assert_eq!(fallback.precision, Precision::Full);
        assert_eq!(fallback.placement, Placement::CpuOnly);
        assert_eq!(fallback.device, Device::Cpu);
        assert_eq!(
            fallback.quantization.map(|q| q.compute_precision),
            Some(Precision::Full)
        );
    }
}
