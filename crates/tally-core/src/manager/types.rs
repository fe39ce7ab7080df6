//! Orchestrator result types

use serde::Serialize;
use std::fmt;

use crate::llm::Message;

/// Destructive step taken by pre-send validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyAction {
    #[default]
    None,
    Compression,
    Rollover,
}

impl fmt::Display for EmergencyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmergencyAction::None => "none",
            EmergencyAction::Compression => "compression",
            EmergencyAction::Rollover => "rollover",
        };
        f.write_str(name)
    }
}

/// Outcome of [`validate_and_build_prompt`](super::ContextManager::validate_and_build_prompt)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptValidation {
    /// False when the prompt must not be sent
    pub valid: bool,
    /// Prompt to send: system prompt, checkpoint summaries, conversation, candidate
    pub messages: Vec<Message>,
    pub total_tokens: usize,
    pub max_tokens: usize,
    /// `total / max * 100` after any emergency action
    pub percentage: f64,
    pub emergency_action: EmergencyAction,
    /// Human-readable note on what happened, if anything did
    pub warning: Option<String>,
    /// Snapshot taken before a rollover
    pub snapshot_id: Option<String>,
}

impl PromptValidation {
    pub fn fraction(&self) -> f64 {
        self.percentage / 100.0
    }
}
