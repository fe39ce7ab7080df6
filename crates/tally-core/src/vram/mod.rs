//! Accelerator memory observation
//!
//! The monitor only reads memory state and raises callbacks; it never touches the
//! conversation. The orchestrator decides what a low-memory signal means.

mod monitor;
mod types;

#[cfg(test)]
mod tests;

pub use monitor::{FixedVramProvider, LowMemoryCallback, ReadingCallback, VramMonitor, VramProvider};
pub use types::{VramConfig, VramInfo};
