//! Conversation messages and the streaming chat-provider seam
//!
//! The engine never talks to an inference backend directly. Summarization goes
//! through [`ChatProvider`], a narrow streaming contract that any backend can implement.

mod messages;
mod provider;

#[cfg(test)]
mod tests;

pub use messages::{Message, MessageRole, ToolCall};
pub use provider::{ChatProvider, ChatRequest, ChatStream, StreamEvent, collect_text};
