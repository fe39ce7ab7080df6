//! Context tiers, operational modes and model profiles
//!
//! A tier is a band of window sizes bound to a compression strategy and a checkpoint
//! cap. The tables live in [`ModelProfile`], which callers may replace per deployment.

mod profile;
mod prompts;
mod types;


pub use profile::{ModelProfile, TierBand};
pub use prompts::SystemPromptBuilder;
pub use types::{ContextTier, OperationalMode, TierPolicy, TierStrategy};
