use std::time::Instant;

use tch::{Kind, Tensor, no_grad};
use tracing::debug;

use crate::{
    error::LmError,
    model::{GenerationRequest, GenerationResult, loader::CausalLm, tokenizer::TokenizerHandle},
};

/// Draws one token from the temperature-scaled distribution restricted to the
/// smallest set of tokens whose probability mass reaches `top_p`.
pub fn sample_top_p(logits: &Tensor, temperature: f64, top_p: f64) -> Result<i64, LmError> {
    let probs = (logits.to_kind(Kind::Float) / temperature).softmax(-1, Kind::Float);
    let (sorted, indices) = probs.sort(-1, true);
    let cumulative = sorted.cumsum(-1, Kind::Float);
    // a token stays in the nucleus while the mass before it is still below top_p
    let outside = (&cumulative - &sorted).gt(top_p);
    let nucleus = sorted.masked_fill(&outside, 0.0);
    let choice = nucleus.f_multinomial(1, false)?;
    Ok(indices.gather(-1, &choice, false).int64_value(&[0]))
}

pub fn generate<M: CausalLm>(
    tokenizer: &TokenizerHandle,
    model: &M,
    request: &GenerationRequest,
) -> Result<GenerationResult, LmError> {
    request.validate()?;

    let mut input_ids: Vec<i64> = tokenizer
        .encode(&request.prompt)?
        .into_iter()
        .map(i64::from)
        .collect();
    if input_ids.is_empty() {
        let pad = tokenizer.pad_token_id().ok_or_else(|| {
            LmError::BadRequest("prompt encodes to no tokens and the tokenizer has no eos".into())
        })?;
        input_ids.push(i64::from(pad));
    }
    let prompt_tokens = input_ids.len();
    let eos = tokenizer.eos_token_id().map(i64::from);
    let device = model.device();

    let start = Instant::now();
    no_grad(|| {
        for _ in 0..request.max_new_tokens {
            let input = Tensor::from_slice(&input_ids)
                .reshape([1, input_ids.len() as i64])
                .to(device);
            let logits = model.forward(&input)?;
            if logits.dim() != 3 {
                return Err(LmError::Inference(format!(
                    "expected logits shaped [batch, seq, vocab], got {:?}",
                    logits.size()
                )));
            }
            let last = logits.select(1, -1).squeeze_dim(0);
            let next = sample_top_p(&last, request.temperature, request.top_p)?;
            input_ids.push(next);
            if Some(next) == eos {
                break;
            }
        }
        Ok::<(), LmError>(())
    })?;
    let elapsed = start.elapsed();

    let ids: Vec<u32> = input_ids
        .iter()
        .map(|&id| {
            u32::try_from(id).map_err(|_| LmError::Inference(format!("token id {id} out of range")))
        })
        .collect::<Result<_, _>>()?;
    let text = tokenizer.decode(&ids)?;

    let tokens_generated = ids.len() - prompt_tokens;
    let tokens_per_second = if elapsed.as_secs_f64() > 0.0 {
        tokens_generated as f64 / elapsed.as_secs_f64()
    } else {
        tokens_generated as f64
    };
    debug!(prompt_tokens, tokens_generated, "generation finished");

    Ok(GenerationResult {
        text,
        prompt_tokens,
        tokens_generated,
        total_time_ms: elapsed.as_millis(),
        tokens_per_second,
    })
}
