//! Top-level configuration type

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::checkpoints::AgingConfig;
use crate::compression::CompressionConfig;
use crate::guard::GuardConfig;
use crate::pool::ContextPoolConfig;
use crate::recovery::RetryConfig;
use crate::snapshots::SnapshotConfig;
use crate::tiers::{OperationalMode, TierPolicy};
use crate::vram::VramConfig;

/// Everything the context manager can be configured with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Session id; generated when unset
    pub session_id: Option<String>,
    /// Base system prompt replacing the mode template
    pub system_prompt: Option<String>,
    pub pool: ContextPoolConfig,
    pub compression: CompressionConfig,
    pub snapshots: SnapshotConfig,
    pub guard: GuardConfig,
    pub checkpoints: AgingConfig,
    pub vram: VramConfig,
    pub retry: RetryConfig,
    pub tier_policy: TierPolicy,
    pub mode: OperationalMode,
    /// Minimum gap between automatic summarizations
    #[serde(with = "humantime_serde")]
    pub auto_summary_cooldown: Duration,
    /// User messages kept by an emergency rollover
    pub rollover_keep_user_messages: usize,
    pub token_cache_capacity: usize,
    /// Buffered events per subscriber before slow subscribers lag
    pub event_capacity: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            system_prompt: None,
            pool: ContextPoolConfig::default(),
            compression: CompressionConfig::default(),
            snapshots: SnapshotConfig::default(),
            guard: GuardConfig::default(),
            checkpoints: AgingConfig::default(),
            vram: VramConfig::default(),
            retry: RetryConfig::default(),
            tier_policy: TierPolicy::default(),
            mode: OperationalMode::default(),
            auto_summary_cooldown: Duration::from_secs(60),
            rollover_keep_user_messages: 10,
            token_cache_capacity: 4096,
            event_capacity: 256,
        }
    }
}

impl TallyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_pool(mut self, pool: ContextPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotConfig) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: AgingConfig) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_vram(mut self, vram: VramConfig) -> Self {
        self.vram = vram;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_tier_policy(mut self, policy: TierPolicy) -> Self {
        self.tier_policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: OperationalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_auto_summary_cooldown(mut self, cooldown: Duration) -> Self {
        self.auto_summary_cooldown = cooldown;
        self
    }
}
