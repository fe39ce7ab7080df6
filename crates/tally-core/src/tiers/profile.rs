//! Deployment-specific tier tables

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::types::{ContextTier, OperationalMode, TierStrategy};

/// One row of the tier table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    pub tier: ContextTier,
    /// Inclusive upper bound, `None` for the open-ended top band
    pub max_size: Option<usize>,
    /// Size picked when auto-sizing lands on this tier
    pub recommended_size: usize,
    pub strategy: TierStrategy,
    pub max_checkpoints: usize,
}

impl TierBand {
    pub fn new(
        tier: ContextTier,
        max_size: Option<usize>,
        recommended_size: usize,
        strategy: TierStrategy,
        max_checkpoints: usize,
    ) -> Self {
        Self {
            tier,
            max_size,
            recommended_size,
            strategy,
            max_checkpoints,
        }
    }

    fn contains(&self, size: usize) -> bool {
        self.max_size.is_none_or(|max| size <= max)
    }
}

/// Tier table, discount and mode overrides for a model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    /// Bands ordered smallest first
    pub bands: Vec<TierBand>,
    /// Fraction of the selected size actually allocated on the backend
    pub discount_factor: f64,
    /// Exact selected-size to allocated-size overrides
    #[serde(default)]
    pub discounted_sizes: BTreeMap<usize, usize>,
    /// Strategy overrides per mode; modes absent here use the tier default
    #[serde(default)]
    pub mode_strategies: HashMap<OperationalMode, TierStrategy>,
}

impl Default for ModelProfile {
    fn default() -> Self {
        let bands = vec![
            TierBand::new(ContextTier::Minimal, Some(4096), 4096, TierStrategy::Rollover, 2),
            TierBand::new(ContextTier::Basic, Some(8192), 8192, TierStrategy::Smart, 3),
            TierBand::new(ContextTier::Standard, Some(32_768), 32_768, TierStrategy::Progressive, 5),
            TierBand::new(ContextTier::Extended, Some(65_536), 65_536, TierStrategy::Structured, 10),
            TierBand::new(ContextTier::Maximum, None, 131_072, TierStrategy::Structured, 15),
        ];

        let mut mode_strategies = HashMap::new();
        mode_strategies.insert(OperationalMode::Planning, TierStrategy::Structured);
        mode_strategies.insert(OperationalMode::Assistant, TierStrategy::Smart);
        mode_strategies.insert(OperationalMode::Debugger, TierStrategy::Progressive);

        Self {
            name: "default".to_string(),
            bands,
            discount_factor: 0.85,
            discounted_sizes: BTreeMap::new(),
            mode_strategies,
        }
    }
}

impl ModelProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_discount_factor(mut self, factor: f64) -> Self {
        self.discount_factor = factor;
        self
    }

    pub fn with_discounted_size(mut self, size: usize, discounted: usize) -> Self {
        self.discounted_sizes.insert(size, discounted);
        self
    }

    /// Replace the band for `band.tier`
    pub fn with_band(mut self, band: TierBand) -> Self {
        match self.bands.iter_mut().find(|b| b.tier == band.tier) {
            Some(existing) => *existing = band,
            None => {
                self.bands.push(band);
                self.bands.sort_by_key(|b| b.tier);
            }
        }
        self
    }

    pub fn with_mode_strategy(mut self, mode: OperationalMode, strategy: TierStrategy) -> Self {
        self.mode_strategies.insert(mode, strategy);
        self
    }

    /// Tier whose band contains `size`
    pub fn tier_for_size(&self, size: usize) -> ContextTier {
        self.bands
            .iter()
            .find(|band| band.contains(size))
            .or_else(|| self.bands.last())
            .map(|band| band.tier)
            .unwrap_or(ContextTier::Maximum)
    }

    pub fn band(&self, tier: ContextTier) -> Option<&TierBand> {
        self.bands.iter().find(|band| band.tier == tier)
    }

    /// Strategy for a tier under a mode.
    ///
    /// Rollover tiers are too small for anything else and ignore the mode.
    pub fn strategy_for(&self, tier: ContextTier, mode: OperationalMode) -> TierStrategy {
        let base = self
            .band(tier)
            .map(|band| band.strategy)
            .unwrap_or(TierStrategy::Smart);
        if base == TierStrategy::Rollover {
            return base;
        }
        self.mode_strategies.get(&mode).copied().unwrap_or(base)
    }

    pub fn max_checkpoints(&self, tier: ContextTier) -> usize {
        self.band(tier).map(|band| band.max_checkpoints).unwrap_or(5)
    }

    /// Size actually allocated on the backend for a selected size
    pub fn discounted_size(&self, size: usize) -> usize {
        if let Some(exact) = self.discounted_sizes.get(&size) {
            return *exact;
        }
        let factor = self.discount_factor.clamp(0.0, 1.0);
        ((size as f64) * factor).floor() as usize
    }
}
