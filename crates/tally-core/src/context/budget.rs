//! Derived token budget

use serde::Serialize;

use super::types::{ConversationContext, SYSTEM_PROMPT_KEY};
use crate::tokens::TokenCounter;

/// Headroom left for conversation after fixed overhead.
///
/// Never stored. Recompute it from a context and the current window size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextBudget {
    pub total_size: usize,
    /// System prompt plus protected content
    pub system_prompt_tokens: usize,
    pub checkpoint_tokens: usize,
    /// `total - system - checkpoints`, floored at zero
    pub available_budget: usize,
    pub conversation_tokens: usize,
    /// `conversation / available * 100`, clamped to `[0, 100]`
    pub budget_percentage: f64,
}

impl ContextBudget {
    pub fn compute(context: &ConversationContext, counter: &TokenCounter, total_size: usize) -> Self {
        let system_prompt_tokens = context
            .system_message()
            .map(|m| counter.count_message(m))
            .unwrap_or(0)
            + context.protected_tokens(counter);
        let checkpoint_tokens = context.checkpoint_tokens(counter);
        let conversation_tokens: usize = context
            .messages
            .iter()
            .filter(|m| !m.has_flag(SYSTEM_PROMPT_KEY))
            .map(|m| counter.count_message(m))
            .sum();

        let available_budget = total_size
            .saturating_sub(system_prompt_tokens)
            .saturating_sub(checkpoint_tokens);
        let budget_percentage = if available_budget == 0 {
            if conversation_tokens == 0 { 0.0 } else { 100.0 }
        } else {
            (conversation_tokens as f64 / available_budget as f64 * 100.0).clamp(0.0, 100.0)
        };

        Self {
            total_size,
            system_prompt_tokens,
            checkpoint_tokens,
            available_budget,
            conversation_tokens,
            budget_percentage,
        }
    }

    pub fn remaining(&self) -> usize {
        self.available_budget.saturating_sub(self.conversation_tokens)
    }
}
