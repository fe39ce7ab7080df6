//! Context window sizing and usage
//!
//! [`ContextPool`] holds the current window size, derives an optimal size from VRAM
//! and model metadata, and defers resizes while a request is in flight.

mod config;
mod core;
mod sizing;


pub use config::{ContextPoolConfig, KvQuantization, ModelInfo};
pub use core::{ContextPool, ContextUsage, ResizeCallback, ResizeOutcome};
pub use sizing::{
    TOKEN_ALIGNMENT, calculate_optimal_size, estimate_weight_bytes, kv_bytes_per_token,
    recommended_auto_size,
};
