//! Live conversation state and the derived token budget
//!
//! [`ConversationContext`] is owned by the context manager. Other components get a
//! reference or a clone for reading.

mod budget;
mod types;

#[cfg(test)]
mod tests;

pub use budget::ContextBudget;
pub use types::{
    CompressionReason, CompressionRecord, ContextMetadata, ConversationContext, ProtectedContent,
    ROLLOVER_MARKER_KEY, SYSTEM_PROMPT_KEY,
};
