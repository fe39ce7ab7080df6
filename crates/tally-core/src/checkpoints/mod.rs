//! Hierarchical compression checkpoints
//!
//! Every compression leaves a [`CompressionCheckpoint`]. Checkpoints are never
//! deleted: as they age they are demoted to shorter representations, and once the
//! tier's cap is exceeded the oldest are merged into a single synthetic checkpoint.

mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use manager::{AgingReport, CheckpointManager};
pub use types::{AgingConfig, CheckpointLevel, CompressionCheckpoint, MessageRange};
