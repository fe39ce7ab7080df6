//! Tally Core Library
//!
//! Adaptive context-budget engine for local LLM sessions. Tracks the token
//! footprint of a conversation, sizes the context window to available VRAM,
//! and compresses, snapshots or rolls over history before the model overflows.

pub mod checkpoints;
pub mod compression;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod llm;
pub mod manager;
pub mod pool;
pub mod recovery;
pub mod snapshots;
pub mod tiers;
pub mod tokens;
pub mod vram;

// Re-export commonly used types
pub use checkpoints::{CheckpointLevel, CheckpointManager, CompressionCheckpoint};
pub use compression::{CompressionConfig, CompressionResult, CompressionService, CompressionStrategy};
pub use concurrency::{SessionId, SessionRegistry};
pub use config::{ConfigValidator, TallyConfig};
pub use context::{CompressionReason, ContextBudget, ConversationContext};
pub use error::{TallyError, TallyResult};
pub use events::{ContextEvent, EventBus};
pub use guard::{GuardAction, GuardConfig, MemoryGuard, MemoryLevel};
pub use llm::{ChatProvider, ChatRequest, Message, MessageRole, StreamEvent};
pub use manager::{
    ContextManager, ContextManagerBuilder, EmergencyAction, GenerationGuard, PromptValidation,
};
pub use pool::{ContextPool, ContextPoolConfig, ContextUsage, KvQuantization, ModelInfo};
pub use snapshots::{
    ContextSnapshot, FileSnapshotStorage, MemorySnapshotStorage, SnapshotManager, SnapshotReason,
    SnapshotStorage,
};
pub use tiers::{ContextTier, ModelProfile, OperationalMode, TierStrategy};
pub use tokens::{TokenCounter, Tokenizer};
pub use vram::{FixedVramProvider, VramConfig, VramInfo, VramMonitor, VramProvider};
