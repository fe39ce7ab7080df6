//! Message compression
//!
//! [`CompressionService`] is stateless with respect to the conversation: it takes a
//! message list and a strategy and returns a reduced set plus an optional summary.
//! User messages and system prompts always survive. Results that fail to reduce the
//! token count are flagged as inflated rather than silently accepted.

mod config;
mod cooldown;
mod extract;
mod partition;
mod service;
mod summary;
mod types;


pub use config::{CompressionConfig, CompressionStrategy};
pub use cooldown::{CooldownGuard, SummaryCooldown};
pub use extract::{extract_file_paths, extract_key_decisions};
pub use partition::{Partition, partition_messages};
pub use service::CompressionService;
pub use summary::{
    SUMMARY_HEADER, build_summary_prompt, extract_summary, format_messages_for_summary,
    placeholder_summary, strip_summary_header, truncate_chars,
};
pub use types::{CompressionEstimate, CompressionResult, CompressionStatus};

/// Metadata flag on summary messages produced by compression
pub const SUMMARY_MARKER_KEY: &str = "tally_summary";
/// Metadata flag on truncation marker messages
pub const TRUNCATION_MARKER_KEY: &str = "tally_truncation";
/// Cumulative number of messages a marker stands for
pub const TRUNCATED_COUNT_KEY: &str = "truncated_count";
/// Number of messages folded into a summary
pub const COMPRESSED_COUNT_KEY: &str = "compressed_count";
