//! Conversation context types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checkpoints::CompressionCheckpoint;
use crate::compression::{CompressionStatus, CompressionStrategy};
use crate::llm::Message;
use crate::tokens::TokenCounter;

/// Metadata flag on the message carrying the system prompt
pub const SYSTEM_PROMPT_KEY: &str = "tally_system_prompt";
/// Metadata flag on the marker left by an emergency rollover
pub const ROLLOVER_MARKER_KEY: &str = "tally_rollover";

/// Content that compression never touches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedContent {
    pub task_definition: Option<String>,
    pub architecture_decisions: Vec<String>,
    pub never_compressed: Vec<String>,
}

impl ProtectedContent {
    pub fn is_empty(&self) -> bool {
        self.task_definition.is_none()
            && self.architecture_decisions.is_empty()
            && self.never_compressed.is_empty()
    }

    /// Render as a system-prompt appendix, `None` when there is nothing to protect
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut sections = Vec::new();
        if let Some(task) = &self.task_definition {
            sections.push(format!("## Task\n{}", task));
        }
        if !self.architecture_decisions.is_empty() {
            let items: Vec<String> = self
                .architecture_decisions
                .iter()
                .map(|d| format!("- {}", d))
                .collect();
            sections.push(format!("## Architecture Decisions\n{}", items.join("\n")));
        }
        if !self.never_compressed.is_empty() {
            sections.push(format!("## Preserved Notes\n{}", self.never_compressed.join("\n")));
        }
        Some(sections.join("\n\n"))
    }
}

/// Why a compression ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionReason {
    /// Allocation check before adding a message
    Auto,
    /// Scheduled by pre-send validation, run after the response
    Deferred,
    Emergency,
    Manual,
    LowMemory,
}

impl fmt::Display for CompressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionReason::Auto => "auto",
            CompressionReason::Deferred => "deferred",
            CompressionReason::Emergency => "emergency",
            CompressionReason::Manual => "manual",
            CompressionReason::LowMemory => "low_memory",
        };
        f.write_str(name)
    }
}

/// Audit entry for one compression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRecord {
    pub at: DateTime<Utc>,
    pub strategy: CompressionStrategy,
    pub reason: CompressionReason,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub messages_removed: usize,
    pub checkpoint_id: Option<String>,
    pub status: CompressionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub compression_history: Vec<CompressionRecord>,
    pub rollover_count: u32,
    pub last_snapshot_id: Option<String>,
}

/// Session state. `messages[0]` is always the system prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub system_prompt: String,
    /// Cached total of `messages`, refreshed by [`recount`](Self::recount)
    pub token_count: usize,
    pub max_tokens: usize,
    /// Ordered oldest first
    pub checkpoints: Vec<CompressionCheckpoint>,
    pub protected: ProtectedContent,
    pub metadata: ContextMetadata,
    pub created_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>, system_prompt: impl Into<String>, max_tokens: usize) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            session_id: session_id.into(),
            messages: vec![system_message(&system_prompt)],
            system_prompt,
            token_count: 0,
            max_tokens,
            checkpoints: Vec::new(),
            protected: ProtectedContent::default(),
            metadata: ContextMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Replace the system prompt message in place
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
        let message = system_message(&self.system_prompt);
        match self.messages.iter().position(|m| m.has_flag(SYSTEM_PROMPT_KEY)) {
            Some(index) => self.messages[index] = message,
            None => self.messages.insert(0, message),
        }
    }

    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.has_flag(SYSTEM_PROMPT_KEY))
    }

    /// Messages after the system prompt
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.has_flag(SYSTEM_PROMPT_KEY))
    }

    pub fn user_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_user())
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Swap in a new message list, restoring the system prompt if it went missing
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        if self.system_message().is_none() {
            self.messages.insert(0, system_message(&self.system_prompt));
        }
    }

    /// Refresh `token_count` from the messages
    pub fn recount(&mut self, counter: &TokenCounter) -> usize {
        self.token_count = counter.count_conversation_tokens(&self.messages);
        self.token_count
    }

    /// Tokens of all checkpoint summaries
    pub fn checkpoint_tokens(&self, counter: &TokenCounter) -> usize {
        self.checkpoints
            .iter()
            .map(|c| counter.count_message(&c.summary))
            .sum()
    }

    /// Tokens of the rendered protected block
    pub fn protected_tokens(&self, counter: &TokenCounter) -> usize {
        self.protected
            .render()
            .map(|text| counter.count_tokens(&text))
            .unwrap_or(0)
    }

    pub fn record_compression(&mut self, record: CompressionRecord) {
        self.metadata.compression_history.push(record);
    }
}

fn system_message(prompt: &str) -> Message {
    Message::system(prompt).with_metadata(SYSTEM_PROMPT_KEY, true)
}
