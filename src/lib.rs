//! Tally
//!
//! Adaptive context budgeting for local LLM sessions. This crate re-exports
//! [`tally_core`]; see [`ContextManager`] for the entry point.

pub use tally_core::*;
