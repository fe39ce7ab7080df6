//! Builder for context managers

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ContextManager;
use super::sizing::prompt_builder;
use crate::checkpoints::CheckpointManager;
use crate::compression::{CompressionService, SummaryCooldown};
use crate::config::{ConfigValidator, TallyConfig};
use crate::context::ConversationContext;
use crate::error::TallyResult;
use crate::events::EventBus;
use crate::guard::MemoryGuard;
use crate::llm::ChatProvider;
use crate::pool::{ContextPool, ModelInfo};
use crate::snapshots::{FileSnapshotStorage, MemorySnapshotStorage, SnapshotManager, SnapshotStorage};
use crate::tiers::ModelProfile;
use crate::tokens::{InFlightTokens, TokenCounter, Tokenizer};
use crate::vram::{FixedVramProvider, VramMonitor, VramProvider};

/// Assembles a [`ContextManager`] from configuration and injected collaborators.
///
/// Anything not supplied falls back to an offline default: no summarization
/// provider (placeholder summaries), a CPU-only VRAM provider, and file or
/// in-memory snapshot storage depending on `snapshots.storage_dir`.
pub struct ContextManagerBuilder {
    config: TallyConfig,
    provider: Option<Arc<dyn ChatProvider>>,
    vram_provider: Option<Arc<dyn VramProvider>>,
    storage: Option<Arc<dyn SnapshotStorage>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    profile: ModelProfile,
    model: Option<ModelInfo>,
    events: Option<EventBus>,
}

impl ContextManagerBuilder {
    pub fn new(config: TallyConfig) -> Self {
        Self {
            config,
            provider: None,
            vram_provider: None,
            storage: None,
            tokenizer: None,
            profile: ModelProfile::default(),
            model: None,
            events: None,
        }
    }

    /// Backend used for summarization
    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_vram_provider(mut self, provider: Arc<dyn VramProvider>) -> Self {
        self.vram_provider = Some(provider);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn SnapshotStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_profile(mut self, profile: ModelProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Model metadata, required for VRAM-based auto-sizing
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.model = Some(model);
        self
    }

    /// Share an event bus with other components
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and build the manager.
    ///
    /// The manager is usable right away; call
    /// [`start`](ContextManager::start) to query VRAM, auto-size and begin monitoring.
    pub fn build(self) -> TallyResult<ContextManager> {
        ConfigValidator::validate(&self.config)?;
        let config = self.config;

        let mut counter = TokenCounter::with_capacity(config.token_cache_capacity);
        if let Some(tokenizer) = self.tokenizer {
            counter = counter.with_tokenizer(tokenizer);
        }
        let counter = Arc::new(counter);

        let pool = Arc::new(ContextPool::new(config.pool.clone()));
        let guard = MemoryGuard::new(config.guard.clone(), pool.clone());

        let mut compression =
            CompressionService::new(config.compression.clone(), counter.clone())
                .with_retry(config.retry.clone());
        if let Some(provider) = self.provider {
            compression = compression.with_provider(provider);
        }

        let storage: Arc<dyn SnapshotStorage> = match (self.storage, &config.snapshots.storage_dir) {
            (Some(storage), _) => storage,
            (None, Some(dir)) => Arc::new(FileSnapshotStorage::new(dir.clone())),
            (None, None) => Arc::new(MemorySnapshotStorage::new()),
        };
        let snapshots = SnapshotManager::new(config.snapshots.clone(), storage)
            .with_retry(config.retry.clone());

        let vram_provider = self
            .vram_provider
            .unwrap_or_else(|| Arc::new(FixedVramProvider::cpu_only()));
        let vram = VramMonitor::new(vram_provider, &config.vram);

        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let prompts = prompt_builder(&config);

        let profile = self.profile;
        let mode = config.mode;
        let size = pool.current_size();
        let tier = profile.tier_for_size(size);
        let context = ConversationContext::new(session_id, prompts.build(tier, mode), size);

        let mut manager = ContextManager {
            checkpoints: CheckpointManager::new(config.checkpoints.clone(), counter.clone()),
            cooldown: SummaryCooldown::new(config.auto_summary_cooldown),
            events: self
                .events
                .unwrap_or_else(|| EventBus::new(config.event_capacity)),
            config,
            context,
            counter,
            pool,
            guard,
            compression,
            snapshots,
            vram,
            model: self.model,
            profile,
            prompts,
            tier,
            mode,
            in_flight: Arc::new(InFlightTokens::new()),
            pending_compression: false,
            low_memory: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            started: false,
        };
        manager.apply_hard_limit();
        manager.context.recount(&manager.counter);
        manager.refresh_usage();

        tracing::debug!(
            "Built context manager for session {} ({} tokens, {} tier, {} mode)",
            manager.session_id(),
            size,
            tier,
            mode
        );
        Ok(manager)
    }
}
