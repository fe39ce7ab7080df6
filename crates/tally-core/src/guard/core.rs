//! Memory guard

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{GuardAction, GuardConfig, MemoryLevel};
use crate::pool::{ContextPool, ContextUsage};

/// Listener fired when a check lands on its level
pub type ThresholdCallback = Arc<dyn Fn(MemoryLevel, ContextUsage) + Send + Sync>;

/// Evaluates pool usage against the configured levels.
///
/// Detection lives here; the reactions are whatever listeners and callers do with
/// the returned [`GuardAction`].
pub struct MemoryGuard {
    config: RwLock<GuardConfig>,
    pool: Arc<ContextPool>,
    /// Effective limit in tokens; 0 means the pool's current size
    hard_limit: AtomicUsize,
    listeners: RwLock<HashMap<MemoryLevel, Vec<ThresholdCallback>>>,
    last_level: Mutex<MemoryLevel>,
}

impl MemoryGuard {
    pub fn new(config: GuardConfig, pool: Arc<ContextPool>) -> Self {
        Self {
            config: RwLock::new(config),
            pool,
            hard_limit: AtomicUsize::new(0),
            listeners: RwLock::new(HashMap::new()),
            last_level: Mutex::new(MemoryLevel::Normal),
        }
    }

    pub fn config(&self) -> GuardConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: GuardConfig) {
        *self.config.write() = config;
    }

    /// Measure against `limit` instead of the pool size, e.g. a discounted backend size
    pub fn set_hard_limit(&self, limit: usize) {
        self.hard_limit.store(limit, Ordering::SeqCst);
    }

    /// Limit usage is measured against
    pub fn limit(&self) -> usize {
        match self.hard_limit.load(Ordering::SeqCst) {
            0 => self.pool.current_size(),
            limit => limit,
        }
    }

    /// Pool usage measured against [`limit`](Self::limit)
    pub fn usage(&self) -> ContextUsage {
        let mut usage = self.pool.get_usage();
        let limit = self.limit();
        usage.max_tokens = limit;
        usage.percentage = if limit == 0 {
            0.0
        } else {
            usage.current_tokens as f64 / limit as f64 * 100.0
        };
        usage
    }

    pub fn level_for(&self, fraction: f64) -> MemoryLevel {
        self.config.read().level_for(fraction)
    }

    pub fn current_level(&self) -> MemoryLevel {
        self.level_for(self.usage().fraction())
    }

    /// Largest total the window may hold: limit minus the safety buffer
    pub fn safe_limit(&self) -> usize {
        self.limit().saturating_sub(self.config.read().safety_buffer)
    }

    /// Whether `tokens` more fit under the safe limit
    pub fn can_allocate(&self, tokens: usize) -> bool {
        self.pool.current_tokens() + tokens <= self.safe_limit()
    }

    pub fn on_threshold(&self, level: MemoryLevel, callback: ThresholdCallback) {
        self.listeners.write().entry(level).or_default().push(callback);
    }

    /// Evaluate the current level, notify its listeners and say what to do
    pub fn check_memory_level_and_act(&self) -> GuardAction {
        let usage = self.usage();
        let level = self.level_for(usage.fraction());

        if level != MemoryLevel::Normal {
            let callbacks = self
                .listeners
                .read()
                .get(&level)
                .cloned()
                .unwrap_or_default();
            for callback in callbacks {
                callback(level, usage);
            }
        }

        match level {
            MemoryLevel::Normal => GuardAction::None,
            MemoryLevel::Warning => {
                tracing::debug!("Context usage at {:.1}%, compression advised", usage.percentage);
                GuardAction::Compress
            }
            MemoryLevel::Critical | MemoryLevel::Emergency => {
                tracing::warn!(
                    "Context usage at {:.1}% ({}), emergency handling required",
                    usage.percentage,
                    level
                );
                GuardAction::Emergency(level)
            }
        }
    }

    /// The current level when it is more severe than the last observed one.
    ///
    /// Falling back to a lower level re-arms the escalation.
    pub fn observe_escalation(&self) -> Option<MemoryLevel> {
        let level = self.current_level();
        let mut last = self.last_level.lock();
        let escalated = level > *last;
        *last = level;
        escalated.then_some(level)
    }
}
