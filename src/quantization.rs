//! Weight-only 4-bit quantization for TorchScript modules.
//!
//! Each floating-point weight matrix is split into groups along its flattened
//! trailing dimensions, snapped onto a symmetric signed 4-bit grid scaled by the
//! group's absolute maximum, and written back in the compute precision.

use tch::{Kind, Tensor, no_grad};
use tracing::debug;

use crate::{error::LmError, model::QuantizationConfig};

const SCALE_FLOOR: f64 = 1e-8;

#[derive(Debug, Clone, Default)]
pub struct QuantizationSummary {
    pub tensors_quantized: usize,
    pub elements_quantized: u64,
    pub baseline_size_bytes: u64,
    pub quantized_size_bytes: u64,
    pub size_reduction_percent: f64,
}

impl QuantizationSummary {
    fn record(&mut self, elements: u64, groups: u64, config: &QuantizationConfig) {
        self.tensors_quantized += 1;
        self.elements_quantized += elements;
        self.baseline_size_bytes += elements * config.compute_precision.bytes_per_element();
        // packed nibbles plus one f32 scale per group
        self.quantized_size_bytes += elements.div_ceil(2) + groups * 4;
        self.size_reduction_percent = if self.baseline_size_bytes == 0 {
            0.0
        } else {
            let diff = self
                .baseline_size_bytes
                .saturating_sub(self.quantized_size_bytes) as f64;
            (diff / self.baseline_size_bytes as f64) * 100.0
        };
    }
}

fn levels(bits: u8) -> Result<(f64, f64), LmError> {
    if !(2..=8).contains(&bits) {
        return Err(LmError::Quantization(format!(
            "unsupported bit width {bits}"
        )));
    }
    let max = f64::from((1u16 << (bits - 1)) - 1);
    Ok((-(max + 1.0), max))
}

/// Returns the dequantized weight and the number of groups used.
pub fn quantize_weight(
    weight: &Tensor,
    config: &QuantizationConfig,
) -> Result<(Tensor, u64), LmError> {
    let (qmin, qmax) = levels(config.bits)?;
    let shape = weight.size();
    let numel = weight.numel() as i64;
    let group = config.group_size as i64;
    // fall back to one group per row when the group size does not tile the tensor
    let group = if group > 0 && numel % group == 0 {
        group
    } else {
        *shape.last().unwrap_or(&numel)
    };

    // fallible ops: device faults surface as LmError::Torch for the load classifier
    let grouped = weight.f_to_kind(Kind::Float)?.f_reshape([-1, group])?;
    let (absmax, _) = grouped.f_abs()?.f_max_dim(-1, true)?;
    let scale = absmax.f_div_scalar(qmax)?.f_clamp_min(SCALE_FLOOR)?;
    let codes = grouped.f_div(&scale)?.f_round()?.f_clamp(qmin, qmax)?;
    let dequantized = codes
        .f_mul(&scale)?
        .f_reshape(shape.as_slice())?
        .f_to_kind(config.compute_precision.kind())?;

    Ok((dequantized, (numel / group) as u64))
}

pub(crate) fn is_float_kind(kind: Kind) -> bool {
    matches!(kind, Kind::Float | Kind::Double | Kind::Half | Kind::BFloat16)
}

/// Quantizes every floating-point parameter of rank two or more in place.
pub fn quantize_parameters(
    parameters: Vec<(String, Tensor)>,
    config: &QuantizationConfig,
) -> Result<QuantizationSummary, LmError> {
    let mut summary = QuantizationSummary::default();
    no_grad(|| {
        for (name, mut param) in parameters {
            if param.dim() < 2 || !is_float_kind(param.kind()) {
                continue;
            }
            debug!(parameter = %name, "quantizing");
            let (dequantized, groups) = quantize_weight(&param, config)?;
            param.f_copy_(&dequantized)?;
            summary.record(param.numel() as u64, groups, config);
        }
        Ok::<(), LmError>(())
    })?;
    Ok(summary)
}
