//! Optimal window size from VRAM and model metadata

use super::config::{ContextPoolConfig, KvQuantization, ModelInfo};
use crate::tiers::ModelProfile;
use crate::vram::VramInfo;

/// Sizes are rounded down to a multiple of this
pub const TOKEN_ALIGNMENT: usize = 1024;

const MIN_KV_BYTES_PER_TOKEN: u64 = 32 * 1024;
// Roughly one f16 KV entry per 14k parameters across common dense architectures.
const PARAMS_PER_KV_BYTE: u64 = 14_000;
// Weights are assumed 4-bit quantized plus runtime overhead.
const WEIGHT_BYTES_PER_PARAM: f64 = 0.6;

/// Estimated KV-cache bytes per context token
pub fn kv_bytes_per_token(model: &ModelInfo, quantization: KvQuantization) -> u64 {
    let f16_bytes = model
        .kv_bytes_per_token
        .unwrap_or_else(|| (model.parameter_count / PARAMS_PER_KV_BYTE).max(MIN_KV_BYTES_PER_TOKEN));
    ((f16_bytes as f64 * quantization.bytes_factor()).ceil() as u64).max(1)
}

/// Estimated resident size of the model weights
pub fn estimate_weight_bytes(model: &ModelInfo) -> u64 {
    (model.parameter_count as f64 * WEIGHT_BYTES_PER_PARAM) as u64
}

/// Largest window the hardware can hold, within configured and model bounds.
///
/// CPU-only readings fall back to the configured target size.
pub fn calculate_optimal_size(
    vram: &VramInfo,
    model: &ModelInfo,
    config: &ContextPoolConfig,
) -> usize {
    let ceiling = config
        .max_size
        .min(model.context_length.max(config.min_size));

    if vram.is_cpu_only() {
        return align_down(config.target_size, config.min_size).min(ceiling);
    }

    let mut usable = vram.available.saturating_sub(config.vram_buffer);
    if !vram.model_loaded {
        usable = usable.saturating_sub(estimate_weight_bytes(model));
    }

    let per_token = kv_bytes_per_token(model, config.kv_quantization);
    let fits = (usable / per_token).min(usize::MAX as u64) as usize;

    let size = align_down(fits.min(ceiling), config.min_size);
    tracing::debug!(
        "Optimal context for {}: {} tokens ({} usable bytes, {} bytes/token)",
        model.name,
        size,
        usable,
        per_token
    );
    size
}

/// Size to use when auto-sizing: one tier below the tier the hardware allows.
///
/// Running one tier down keeps generation away from the hardware ceiling.
pub fn recommended_auto_size(max_possible: usize, profile: &ModelProfile) -> usize {
    let tier = profile.tier_for_size(max_possible);
    let target = tier.lower();
    profile
        .band(target)
        .map(|band| band.recommended_size)
        .unwrap_or(max_possible)
        .min(max_possible)
}

fn align_down(tokens: usize, floor: usize) -> usize {
    ((tokens / TOKEN_ALIGNMENT) * TOKEN_ALIGNMENT).max(floor)
}
