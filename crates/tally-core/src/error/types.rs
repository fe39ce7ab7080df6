//! Core error type for the context engine

use thiserror::Error;

/// Result type alias for engine operations
pub type TallyResult<T> = Result<T, TallyError>;

/// Main error type for the context engine
#[derive(Error, Debug, Clone)]
pub enum TallyError {
    /// A message cannot fit in the window even after compression and truncation
    #[error("Allocation exceeded: requested {requested} tokens, {available} available")]
    AllocationExceeded {
        requested: usize,
        available: usize,
        context: Option<String>,
    },

    /// Compression produced no net token savings
    #[error("Compression inflated token usage: {original} -> {compressed} tokens")]
    CompressionInflated {
        original: usize,
        compressed: usize,
        context: Option<String>,
    },

    /// The summarization provider was unreachable, timed out, or returned nothing usable
    #[error("Summarization failed: {message}")]
    SummarizationFailed {
        message: String,
        context: Option<String>,
    },

    /// Rollover or emergency compression could not complete
    #[error("Emergency action '{action}' failed: {message}")]
    EmergencyActionFailed {
        action: String,
        message: String,
        context: Option<String>,
    },

    /// Snapshot persistence errors
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        context: Option<String>,
    },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Chat provider errors
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        context: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        context: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
        context: Option<String>,
    },

    /// Operation exceeded its deadline
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        seconds: u64,
        context: Option<String>,
    },

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        resource_type: Option<String>,
        context: Option<String>,
    },

    /// Generic error with context
    #[error("Error: {message}")]
    Other {
        message: String,
        context: Option<String>,
    },
}

impl TallyError {
    /// Stable code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AllocationExceeded { .. } => "TALLY_ALLOCATION_EXCEEDED",
            Self::CompressionInflated { .. } => "TALLY_COMPRESSION_INFLATED",
            Self::SummarizationFailed { .. } => "TALLY_SUMMARIZATION_FAILED",
            Self::EmergencyActionFailed { .. } => "TALLY_EMERGENCY_ACTION_FAILED",
            Self::Storage { .. } => "TALLY_STORAGE",
            Self::Config { .. } => "TALLY_CONFIG",
            Self::Llm { .. } => "TALLY_LLM",
            Self::Io { .. } => "TALLY_IO",
            Self::Json { .. } => "TALLY_JSON",
            Self::InvalidInput { .. } => "TALLY_INVALID_INPUT",
            Self::Timeout { .. } => "TALLY_TIMEOUT",
            Self::Cancelled => "TALLY_CANCELLED",
            Self::NotFound { .. } => "TALLY_NOT_FOUND",
            Self::Other { .. } => "TALLY_OTHER",
        }
    }

    /// Optional context attached to the error
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::AllocationExceeded { context, .. }
            | Self::CompressionInflated { context, .. }
            | Self::SummarizationFailed { context, .. }
            | Self::EmergencyActionFailed { context, .. }
            | Self::Storage { context, .. }
            | Self::Config { context, .. }
            | Self::Llm { context, .. }
            | Self::Io { context, .. }
            | Self::Json { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::Timeout { context, .. }
            | Self::NotFound { context, .. }
            | Self::Other { context, .. } => context.as_deref(),
            Self::Cancelled => None,
        }
    }

    /// Whether a retry with backoff may succeed.
    ///
    /// Transient failures (provider calls, timeouts, snapshot I/O) are retryable.
    /// Allocation and emergency-action failures never are: they must surface to the
    /// caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Llm { .. }
                | Self::Timeout { .. }
                | Self::SummarizationFailed { .. }
                | Self::Storage { .. }
                | Self::Io { .. }
        )
    }
}
