//! Memory guard: usage levels and the reactions bound to them

mod core;
mod types;


pub use core::{MemoryGuard, ThresholdCallback};
pub use types::{GuardAction, GuardConfig, MemoryLevel};
