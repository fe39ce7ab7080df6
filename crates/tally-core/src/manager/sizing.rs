//! Startup, window sizing, tier detection and configuration changes

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::ContextManager;
use crate::config::{ConfigValidator, TallyConfig};
use crate::context::CompressionReason;
use crate::error::TallyResult;
use crate::events::ContextEvent;
use crate::pool::{ResizeOutcome, recommended_auto_size};
use crate::tiers::{ContextTier, OperationalMode, SystemPromptBuilder, TierPolicy};
use crate::vram::VramInfo;

impl ContextManager {
    /// Query VRAM, auto-size the window when configured, and start monitoring.
    ///
    /// Calling it again is a no-op.
    pub async fn start(&mut self) -> TallyResult<()> {
        if self.started {
            return Ok(());
        }

        let pool = self.pool.clone();
        self.vram
            .on_reading(Arc::new(move |info: VramInfo| pool.update_vram_info(info)));

        let flag = self.low_memory.clone();
        let events = self.events.clone();
        self.vram.on_low_memory(Arc::new(move |info: VramInfo| {
            flag.store(true, Ordering::SeqCst);
            events.publish(ContextEvent::LowMemory {
                available: info.available,
                total: info.total,
            });
        }));

        let info = match self.vram.get_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Initial VRAM query failed: {}", e);
                None
            }
        };

        if self.config.pool.auto_size {
            match (info, self.model.as_ref()) {
                (Some(info), Some(model)) => {
                    let max_possible = self.pool.calculate_optimal_size(&info, model);
                    let size = recommended_auto_size(max_possible, &self.profile);
                    tracing::info!(
                        "Auto-sizing context: hardware allows {} tokens, using {}",
                        max_possible,
                        size
                    );
                    self.set_context_size(size)?;
                }
                _ => tracing::debug!("Auto-size requested without VRAM reading or model info"),
            }
        }

        if self.config.vram.enabled && info.is_some_and(|i| !i.is_cpu_only()) {
            self.vram.start_monitoring(self.config.vram.poll_interval);
        }

        self.refresh_tier();
        self.started = true;
        self.events.publish(ContextEvent::Started {
            session_id: self.session_id().to_string(),
            tier: self.tier,
            mode: self.mode,
            max_tokens: self.hard_limit(),
        });
        tracing::info!(
            "Context manager started for session {}: {} tokens ({} usable), {} tier, {} strategy",
            self.session_id(),
            self.context_size(),
            self.hard_limit(),
            self.tier,
            self.strategy()
        );

        if self.take_low_memory() {
            self.handle_low_memory().await?;
        }
        Ok(())
    }

    /// Poll VRAM now and react if memory just ran low
    pub async fn check_vram(&mut self) -> TallyResult<VramInfo> {
        let info = self.vram.get_info().await?;
        if self.take_low_memory() {
            self.handle_low_memory().await?;
        }
        Ok(info)
    }

    /// Tier for the current size under the configured policy
    pub fn detect_tier(&self) -> ContextTier {
        match self.config.tier_policy {
            TierPolicy::UserSize => self.profile.tier_for_size(self.context_size()),
            TierPolicy::HardwareLocked => {
                let hardware = match (self.pool.vram_info(), self.model.as_ref()) {
                    (Some(info), Some(model)) if !info.is_cpu_only() => {
                        Some(self.pool.calculate_optimal_size(&info, model))
                    }
                    _ => None,
                };
                self.profile
                    .tier_for_size(hardware.unwrap_or_else(|| self.context_size()))
            }
        }
    }

    /// Re-detect the tier; on change swap the prompt template and emit `tier-changed`.
    ///
    /// Returns true when the tier changed.
    pub fn refresh_tier(&mut self) -> bool {
        let tier = self.detect_tier();
        if tier == self.tier {
            return false;
        }

        let from = self.tier;
        self.tier = tier;
        self.rebuild_system_prompt();
        let strategy = self.strategy();
        let max_checkpoints = self.max_checkpoints();
        tracing::info!(
            "Context tier changed: {} -> {} ({} strategy, {} checkpoints max)",
            from,
            tier,
            strategy,
            max_checkpoints
        );
        self.events.publish(ContextEvent::TierChanged {
            from,
            to: tier,
            strategy,
            max_checkpoints,
        });
        true
    }

    /// Resize the window. Deferred while a generation is in flight.
    pub fn set_context_size(&mut self, size: usize) -> TallyResult<ResizeOutcome> {
        let outcome = self.pool.resize(size)?;
        if let ResizeOutcome::Applied { old_size, new_size } = outcome {
            self.on_resized(old_size, new_size);
        }
        Ok(outcome)
    }

    pub fn set_mode(&mut self, mode: OperationalMode) {
        if mode == self.mode {
            return;
        }
        let from = self.mode;
        self.mode = mode;
        self.config.mode = mode;
        self.rebuild_system_prompt();
        tracing::info!("Operational mode changed: {} -> {} ({} strategy)", from, mode, self.strategy());
        self.events.publish(ContextEvent::ModeChanged { from, to: mode });
    }

    /// Apply a new configuration to the running session.
    ///
    /// Pool bounds, quantization and the VRAM buffer are fixed for the session;
    /// only the target size is applied from `pool`.
    pub fn update_config(&mut self, config: TallyConfig) -> TallyResult<()> {
        ConfigValidator::validate(&config)?;

        if config.pool != self.config.pool {
            let fixed_changed = config.pool.min_size != self.config.pool.min_size
                || config.pool.max_size != self.config.pool.max_size
                || config.pool.vram_buffer != self.config.pool.vram_buffer
                || config.pool.kv_quantization != self.config.pool.kv_quantization;
            if fixed_changed {
                tracing::warn!("Pool bounds cannot change mid-session; keeping the current bounds");
            }
        }

        self.compression.set_config(config.compression.clone());
        self.guard.set_config(config.guard.clone());
        self.snapshots.set_config(config.snapshots.clone());
        self.checkpoints.set_config(config.checkpoints.clone());
        self.cooldown.set_cooldown(config.auto_summary_cooldown);

        let target = config.pool.target_size;
        let target_changed = target != self.config.pool.target_size;
        let mode = config.mode;
        let prompt_changed = config.system_prompt != self.config.system_prompt;

        let mut next = config;
        next.pool.min_size = self.config.pool.min_size;
        next.pool.max_size = self.config.pool.max_size;
        next.pool.vram_buffer = self.config.pool.vram_buffer;
        next.pool.kv_quantization = self.config.pool.kv_quantization;
        next.session_id = self.config.session_id.clone();
        next.mode = self.mode;
        self.config = next;

        if prompt_changed {
            self.prompts = prompt_builder(&self.config);
            self.rebuild_system_prompt();
        }
        if target_changed {
            self.set_context_size(target)?;
        }
        self.set_mode(mode);
        self.refresh_tier();
        self.refresh_usage();

        tracing::info!("Configuration updated for session {}", self.session_id());
        self.events.publish(ContextEvent::ConfigUpdated);
        Ok(())
    }

    /// React to low accelerator memory: compress, then step down one tier
    pub async fn handle_low_memory(&mut self) -> TallyResult<()> {
        let strategy = self.compression_strategy();
        let _ = self.compress_context(strategy, CompressionReason::LowMemory).await;

        let lower = self.tier.lower();
        if lower == self.tier {
            return Ok(());
        }
        if let Some(band) = self.profile.band(lower) {
            let size = band.recommended_size.min(self.context_size());
            tracing::warn!(
                "Low VRAM: shrinking context from {} to {} tokens ({} tier)",
                self.context_size(),
                size,
                lower
            );
            self.set_context_size(size)?;
        }
        Ok(())
    }

    /// Pick up a resize the pool applied when the last request ended
    pub(super) fn sync_pool_resize(&mut self) {
        if let Some((old_size, new_size)) = self.pool.take_applied_resize() {
            self.on_resized(old_size, new_size);
        }
    }

    pub(super) fn apply_hard_limit(&mut self) {
        let limit = self.profile.discounted_size(self.context_size()).max(1);
        self.guard.set_hard_limit(limit);
        self.context.max_tokens = limit;
    }

    fn on_resized(&mut self, old_size: usize, new_size: usize) {
        self.config.pool.target_size = new_size;
        self.apply_hard_limit();
        tracing::info!(
            "Context resized: {} -> {} tokens ({} usable)",
            old_size,
            new_size,
            self.hard_limit()
        );
        self.events
            .publish(ContextEvent::ContextResized { old_size, new_size });
        self.refresh_tier();
        self.refresh_usage();
    }

    pub(super) fn rebuild_system_prompt(&mut self) {
        let prompt = self.prompts.build(self.tier, self.mode);
        if self.context.system_prompt == prompt && self.context.system_message().is_some() {
            return;
        }
        self.context.set_system_prompt(prompt);
        self.context.recount(&self.counter);
    }
}

/// Prompt builder honoring a configured base prompt
pub(super) fn prompt_builder(config: &TallyConfig) -> SystemPromptBuilder {
    match &config.system_prompt {
        Some(base) => SystemPromptBuilder::new().with_base(base.clone()),
        None => SystemPromptBuilder::new(),
    }
}
