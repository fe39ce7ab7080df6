//! Pool configuration and model metadata

use serde::{Deserialize, Serialize};

/// KV-cache element type, which scales per-token memory cost
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KvQuantization {
    #[default]
    #[serde(rename = "f16")]
    F16,
    #[serde(rename = "q8_0")]
    Q8,
    #[serde(rename = "q4_0")]
    Q4,
}

impl KvQuantization {
    /// Per-token byte cost relative to f16
    pub fn bytes_factor(&self) -> f64 {
        match self {
            KvQuantization::F16 => 1.0,
            KvQuantization::Q8 => 0.5,
            KvQuantization::Q4 => 0.25,
        }
    }
}

/// Window sizing configuration.
///
/// `target_size` is the size the user selected. It is the input to tier detection;
/// the effective hard limit may be smaller once the model profile discount applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextPoolConfig {
    pub target_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    /// Derive the size from VRAM instead of using `target_size`
    pub auto_size: bool,
    /// Bytes of VRAM always left free
    pub vram_buffer: u64,
    pub kv_quantization: KvQuantization,
}

impl Default for ContextPoolConfig {
    fn default() -> Self {
        Self {
            target_size: 8192,
            min_size: 2048,
            max_size: 131_072,
            auto_size: false,
            vram_buffer: 512 * 1024 * 1024,
            kv_quantization: KvQuantization::F16,
        }
    }
}

impl ContextPoolConfig {
    pub fn with_target_size(mut self, size: usize) -> Self {
        self.target_size = size;
        self
    }

    pub fn with_bounds(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn with_auto_size(mut self, auto_size: bool) -> Self {
        self.auto_size = auto_size;
        self
    }

    pub fn with_vram_buffer(mut self, bytes: u64) -> Self {
        self.vram_buffer = bytes;
        self
    }

    pub fn with_kv_quantization(mut self, quantization: KvQuantization) -> Self {
        self.kv_quantization = quantization;
        self
    }

    /// Clamp a requested size into `[min_size, max_size]`
    pub fn clamp_size(&self, size: usize) -> usize {
        size.max(self.min_size).min(self.max_size.max(self.min_size))
    }
}

/// Model metadata used for sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub parameter_count: u64,
    /// Maximum context the model was trained for
    pub context_length: usize,
    /// Exact f16 KV bytes per token when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kv_bytes_per_token: Option<u64>,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, parameter_count: u64, context_length: usize) -> Self {
        Self {
            name: name.into(),
            parameter_count,
            context_length,
            kv_bytes_per_token: None,
        }
    }

    pub fn with_kv_bytes_per_token(mut self, bytes: u64) -> Self {
        self.kv_bytes_per_token = Some(bytes);
        self
    }
}
