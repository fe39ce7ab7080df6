//! Context pool state

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::config::{ContextPoolConfig, ModelInfo};
use super::sizing::calculate_optimal_size;
use crate::error::{TallyError, TallyResult};
use crate::vram::VramInfo;

/// Usage snapshot of the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub current_tokens: usize,
    pub max_tokens: usize,
    /// current / max * 100, may exceed 100 when over the limit
    pub percentage: f64,
    pub vram_used: u64,
    pub vram_total: u64,
}

impl ContextUsage {
    /// Usage as a fraction of the window
    pub fn fraction(&self) -> f64 {
        self.percentage / 100.0
    }
}

/// Outcome of a resize request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    Applied { old_size: usize, new_size: usize },
    /// Recorded and applied when the last in-flight request ends
    Deferred { requested: usize },
    Unchanged,
}

/// Called with `(old_size, new_size)` after a resize takes effect
pub type ResizeCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug)]
struct PoolState {
    current_size: usize,
    current_tokens: usize,
    vram: Option<VramInfo>,
    active_requests: usize,
    pending_resize: Option<usize>,
    applied_resize: Option<(usize, usize)>,
}

/// Holds the current window size and tracks usage against it
pub struct ContextPool {
    config: ContextPoolConfig,
    state: Mutex<PoolState>,
    callbacks: RwLock<Vec<ResizeCallback>>,
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl ContextPool {
    pub fn new(config: ContextPoolConfig) -> Self {
        let current_size = config.clamp_size(config.target_size);
        Self {
            config,
            state: Mutex::new(PoolState {
                current_size,
                current_tokens: 0,
                vram: None,
                active_requests: 0,
                pending_resize: None,
                applied_resize: None,
            }),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ContextPoolConfig {
        &self.config
    }

    /// Current window size in tokens
    pub fn current_size(&self) -> usize {
        self.state.lock().current_size
    }

    pub fn current_tokens(&self) -> usize {
        self.state.lock().current_tokens
    }

    pub fn set_current_tokens(&self, tokens: usize) {
        self.state.lock().current_tokens = tokens;
    }

    pub fn update_vram_info(&self, info: VramInfo) {
        self.state.lock().vram = Some(info);
    }

    pub fn vram_info(&self) -> Option<VramInfo> {
        self.state.lock().vram
    }

    pub fn get_usage(&self) -> ContextUsage {
        let state = self.state.lock();
        let percentage = if state.current_size == 0 {
            0.0
        } else {
            state.current_tokens as f64 / state.current_size as f64 * 100.0
        };
        let (vram_used, vram_total) = state.vram.map(|v| (v.used, v.total)).unwrap_or((0, 0));
        ContextUsage {
            current_tokens: state.current_tokens,
            max_tokens: state.current_size,
            percentage,
            vram_used,
            vram_total,
        }
    }

    /// Optimal size for the given hardware and model under this pool's config
    pub fn calculate_optimal_size(&self, vram: &VramInfo, model: &ModelInfo) -> usize {
        calculate_optimal_size(vram, model, &self.config)
    }

    /// Register a callback invoked after every applied resize
    pub fn on_resize(&self, callback: ResizeCallback) {
        self.callbacks.write().push(callback);
    }

    /// Resize the window, clamped to the configured bounds.
    ///
    /// While requests are in flight the resize is recorded and applied by the final
    /// [`end_request`](Self::end_request).
    pub fn resize(&self, new_size: usize) -> TallyResult<ResizeOutcome> {
        if new_size == 0 {
            return Err(TallyError::invalid_input_field(
                "context size must be greater than zero",
                "new_size",
            ));
        }
        let new_size = self.config.clamp_size(new_size);

        let applied = {
            let mut state = self.state.lock();
            if state.active_requests > 0 {
                state.pending_resize = Some(new_size);
                tracing::debug!(
                    "Deferring resize to {} tokens: {} request(s) in flight",
                    new_size,
                    state.active_requests
                );
                return Ok(ResizeOutcome::Deferred {
                    requested: new_size,
                });
            }
            if state.current_size == new_size {
                state.pending_resize = None;
                return Ok(ResizeOutcome::Unchanged);
            }
            let old_size = state.current_size;
            state.current_size = new_size;
            state.pending_resize = None;
            (old_size, new_size)
        };

        self.notify_resize(applied.0, applied.1);
        Ok(ResizeOutcome::Applied {
            old_size: applied.0,
            new_size: applied.1,
        })
    }

    pub fn begin_request(&self) {
        self.state.lock().active_requests += 1;
    }

    /// Finish a request, applying any deferred resize once none remain
    pub fn end_request(&self) -> Option<ResizeOutcome> {
        let applied = {
            let mut state = self.state.lock();
            state.active_requests = state.active_requests.saturating_sub(1);
            if state.active_requests > 0 {
                return None;
            }
            let requested = state.pending_resize.take()?;
            if requested == state.current_size {
                return Some(ResizeOutcome::Unchanged);
            }
            let old_size = state.current_size;
            state.current_size = requested;
            state.applied_resize = Some((old_size, requested));
            (old_size, requested)
        };

        tracing::info!(
            "Applied deferred resize: {} -> {} tokens",
            applied.0,
            applied.1
        );
        self.notify_resize(applied.0, applied.1);
        Some(ResizeOutcome::Applied {
            old_size: applied.0,
            new_size: applied.1,
        })
    }

    pub fn has_active_requests(&self) -> bool {
        self.state.lock().active_requests > 0
    }

    pub fn pending_resize(&self) -> Option<usize> {
        self.state.lock().pending_resize
    }

    /// Take the last resize applied by `end_request`, if not yet observed
    pub fn take_applied_resize(&self) -> Option<(usize, usize)> {
        self.state.lock().applied_resize.take()
    }

    fn notify_resize(&self, old_size: usize, new_size: usize) {
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(old_size, new_size);
        }
    }
}
