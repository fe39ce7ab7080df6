//! System prompt templates by tier and mode

use super::types::{ContextTier, OperationalMode};

/// Renders the system prompt for the active tier and mode
#[derive(Debug, Clone, Default)]
pub struct SystemPromptBuilder {
    base_override: Option<String>,
}

impl SystemPromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-supplied base prompt instead of the mode template
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_override = Some(base.into());
        self
    }

    pub fn build(&self, tier: ContextTier, mode: OperationalMode) -> String {
        let base = self
            .base_override
            .as_deref()
            .unwrap_or_else(|| mode_template(mode));
        format!("{}\n\n{}", base.trim_end(), tier_guidance(tier))
    }
}

fn mode_template(mode: OperationalMode) -> &'static str {
    match mode {
        OperationalMode::Developer => {
            "You are a software engineering assistant in a long-running session. \
             Make focused changes, explain decisions briefly and keep track of the files you touch."
        }
        OperationalMode::Planning => {
            "You are a planning assistant. Break goals into ordered steps, \
             record decisions explicitly and keep the plan consistent as it evolves."
        }
        OperationalMode::Assistant => {
            "You are a helpful assistant. Answer directly and keep responses \
             proportional to the question."
        }
        OperationalMode::Debugger => {
            "You are a debugging assistant. Form hypotheses from evidence, narrow them \
             down methodically and state what each experiment showed."
        }
    }
}

fn tier_guidance(tier: ContextTier) -> String {
    match tier {
        ContextTier::Minimal => format!(
            "Context is very limited ({}). Keep replies short; older turns are dropped as the window fills.",
            tier.label()
        ),
        ContextTier::Basic => format!(
            "Context is limited ({}). Be concise; older turns are summarized as the window fills.",
            tier.label()
        ),
        ContextTier::Standard => format!(
            "Context window: {}. Earlier history is progressively summarized into checkpoints.",
            tier.label()
        ),
        ContextTier::Extended | ContextTier::Maximum => format!(
            "Context window: {}. Earlier history is kept as structured checkpoints listing goals \
             and decisions. Consult them before asking the user to repeat information.",
            tier.label()
        ),
    }
}
