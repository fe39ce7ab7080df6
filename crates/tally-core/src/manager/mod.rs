//! Per-session context orchestrator
//!
//! [`ContextManager`] owns the live [`ConversationContext`] and ties the other
//! components into one control loop:
//!
//! ```text
//! add_message → count → guard.can_allocate? ──no──► compress (tier strategy)
//!                                                  └► forced truncate
//!                                                  └► AllocationExceeded
//! validate_and_build_prompt → <80% send │ 80-95% warn, compress after reply
//!                             95-100% emergency compression │ >100% rollover
//! ```
//!
//! All mutation goes through `&mut self`. Wrap managers in a
//! [`SessionRegistry`](crate::concurrency::SessionRegistry) to serialize
//! externally triggered operations per session.

mod builder;
mod compaction;
mod generation;
mod messages;
mod sizing;
mod snapshots;
mod types;
mod validation;


pub use builder::ContextManagerBuilder;
pub use generation::GenerationGuard;
pub use types::{EmergencyAction, PromptValidation};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::checkpoints::CheckpointManager;
use crate::compression::{CompressionService, CompressionStrategy, SummaryCooldown};
use crate::config::TallyConfig;
use crate::context::{ContextBudget, ConversationContext, ProtectedContent};
use crate::events::{ContextEvent, EventBus};
use crate::guard::{MemoryGuard, MemoryLevel};
use crate::llm::Message;
use crate::pool::{ContextPool, ContextUsage, ModelInfo};
use crate::snapshots::SnapshotManager;
use crate::tiers::{ContextTier, ModelProfile, OperationalMode, SystemPromptBuilder, TierStrategy};
use crate::tokens::{InFlightTokens, TokenCounter};
use crate::vram::VramMonitor;

/// Orchestrates token accounting, compression, checkpoints and snapshots for one session
pub struct ContextManager {
    config: TallyConfig,
    context: ConversationContext,
    counter: Arc<TokenCounter>,
    pool: Arc<ContextPool>,
    guard: MemoryGuard,
    compression: CompressionService,
    checkpoints: CheckpointManager,
    snapshots: SnapshotManager,
    vram: VramMonitor,
    model: Option<ModelInfo>,
    profile: ModelProfile,
    prompts: SystemPromptBuilder,
    events: EventBus,
    tier: ContextTier,
    mode: OperationalMode,
    in_flight: Arc<InFlightTokens>,
    cooldown: SummaryCooldown,
    /// Set by pre-send validation in the warning band
    pending_compression: bool,
    /// Raised by the VRAM monitor, handled on the next operation
    low_memory: Arc<AtomicBool>,
    shutdown: CancellationToken,
    started: bool,
}

impl ContextManager {
    pub fn builder(config: TallyConfig) -> ContextManagerBuilder {
        ContextManagerBuilder::new(config)
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn tier(&self) -> ContextTier {
        self.tier
    }

    pub fn mode(&self) -> OperationalMode {
        self.mode
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    /// Tier strategy for the current tier and mode
    pub fn strategy(&self) -> TierStrategy {
        self.profile.strategy_for(self.tier, self.mode)
    }

    /// Compression strategy used by automatic compression
    pub fn compression_strategy(&self) -> CompressionStrategy {
        self.config
            .compression
            .strategy
            .unwrap_or_else(|| self.strategy().compression_strategy())
    }

    pub fn max_checkpoints(&self) -> usize {
        self.profile.max_checkpoints(self.tier)
    }

    /// Window size the user selected
    pub fn context_size(&self) -> usize {
        self.pool.current_size()
    }

    /// Limit prompts are validated against: the selected size after the profile discount
    pub fn hard_limit(&self) -> usize {
        self.guard.limit()
    }

    pub fn counter(&self) -> &Arc<TokenCounter> {
        &self.counter
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.pool
    }

    pub fn guard(&self) -> &MemoryGuard {
        &self.guard
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn vram(&self) -> &VramMonitor {
        &self.vram
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    pub fn is_compression_pending(&self) -> bool {
        self.pending_compression
    }

    pub fn in_flight_tokens(&self) -> usize {
        self.in_flight.current()
    }

    pub fn total_compressions(&self) -> u64 {
        self.checkpoints.total_compressions()
    }

    /// Derived budget against the hard limit
    pub fn get_budget(&self) -> ContextBudget {
        ContextBudget::compute(&self.context, &self.counter, self.hard_limit())
    }

    /// Current usage, in-flight generation included
    pub fn usage(&self) -> ContextUsage {
        self.refresh_usage();
        self.guard.usage()
    }

    pub fn memory_level(&self) -> MemoryLevel {
        self.refresh_usage();
        self.guard.current_level()
    }

    /// Pin the task definition into every prompt
    pub fn protect_task_definition(&mut self, task: impl Into<String>) {
        self.context.protected.task_definition = Some(task.into());
        self.refresh_usage();
    }

    pub fn add_architecture_decision(&mut self, decision: impl Into<String>) {
        self.context.protected.architecture_decisions.push(decision.into());
        self.refresh_usage();
    }

    /// Pin free-form content that compression must never touch
    pub fn protect_content(&mut self, content: impl Into<String>) {
        self.context.protected.never_compressed.push(content.into());
        self.refresh_usage();
    }

    pub fn clear_protected(&mut self) {
        self.context.protected = ProtectedContent::default();
        self.refresh_usage();
    }

    /// Stop background monitoring and abort in-flight summarization
    pub fn shutdown(&mut self) {
        self.vram.stop_monitoring();
        self.shutdown.cancel();
        tracing::info!("Context manager for session {} shut down", self.session_id());
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Messages as sent to the backend, optionally followed by `candidate`
    pub fn build_prompt(&self, candidate: Option<&Message>) -> Vec<Message> {
        let mut prompt = Vec::with_capacity(
            self.context.messages.len() + self.context.checkpoints.len() + 1,
        );

        if let Some(system) = self.context.system_message() {
            let mut system = system.clone();
            if let Some(protected) = self.context.protected.render() {
                system.content = format!("{}\n\n{}", system.content, protected);
                system.id = format!("{}-protected", system.id);
            }
            prompt.push(system);
        }
        prompt.extend(self.context.checkpoints.iter().map(|c| c.summary.clone()));
        prompt.extend(self.context.conversation().cloned());
        if let Some(candidate) = candidate {
            prompt.push(candidate.clone());
        }
        prompt
    }

    /// Tokens of the prompt without a candidate
    pub fn prompt_tokens(&self) -> usize {
        self.counter
            .count_conversation_tokens(&self.build_prompt(None))
    }

    /// Push committed plus in-flight tokens into the pool
    fn refresh_usage(&self) {
        self.pool
            .set_current_tokens(self.prompt_tokens() + self.in_flight.current());
    }

    fn publish_usage(&self) -> ContextUsage {
        let usage = self.usage();
        self.events.publish(ContextEvent::UsageUpdated(usage));
        usage
    }

    fn take_low_memory(&self) -> bool {
        self.low_memory.swap(false, Ordering::SeqCst)
    }
}
