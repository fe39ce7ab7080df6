//! Token accounting
//!
//! [`TokenCounter`] measures text and whole conversations and memoizes per-message
//! counts. [`StreamingTokenCounter`] and [`InFlightTokens`] track the cost of a
//! response while it is still streaming so threshold checks see the prospective total.

mod counter;
mod streaming;

#[cfg(test)]
mod tests;

pub use counter::{
    CHARS_PER_TOKEN, MESSAGE_OVERHEAD, TOOL_CALL_OVERHEAD, TokenCounter, TokenCounterMetrics,
    Tokenizer,
};
pub use streaming::{InFlightTokens, StreamingTokenCounter};
