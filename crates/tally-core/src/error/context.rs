//! Context management for TallyError

use std::fmt::Display;

use super::types::{TallyError, TallyResult};

impl TallyError {
    /// Attach context to an existing error, replacing any previous context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = Some(context.into());
        match &mut self {
            Self::AllocationExceeded { context: c, .. } => *c = ctx,
            Self::CompressionInflated { context: c, .. } => *c = ctx,
            Self::SummarizationFailed { context: c, .. } => *c = ctx,
            Self::EmergencyActionFailed { context: c, .. } => *c = ctx,
            Self::Storage { context: c, .. } => *c = ctx,
            Self::Config { context: c, .. } => *c = ctx,
            Self::Llm { context: c, .. } => *c = ctx,
            Self::Io { context: c, .. } => *c = ctx,
            Self::Json { context: c, .. } => *c = ctx,
            Self::InvalidInput { context: c, .. } => *c = ctx,
            Self::Timeout { context: c, .. } => *c = ctx,
            Self::NotFound { context: c, .. } => *c = ctx,
            Self::Other { context: c, .. } => *c = ctx,
            Self::Cancelled => {}
        }
        self
    }
}

/// Attach context to foreign errors while converting them into [`TallyError`]
pub trait ResultExt<T> {
    /// Wrap the error, prefixing its message with `context`
    fn context<C: Display>(self, context: C) -> TallyResult<T>;

    /// Like [`ResultExt::context`], building the context only on failure
    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> TallyResult<T>;
}

impl<T, E: Display> ResultExt<T> for Result<T, E> {
    fn context<C: Display>(self, context: C) -> TallyResult<T> {
        self.map_err(|e| TallyError::other(format!("{}: {}", context, e)))
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> TallyResult<T> {
        self.map_err(|e| TallyError::other(format!("{}: {}", f(), e)))
    }
}

/// Turn a missing value into [`TallyError::NotFound`]
pub trait OptionExt<T> {
    fn context<C: Display>(self, context: C) -> TallyResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context<C: Display>(self, context: C) -> TallyResult<T> {
        self.ok_or_else(|| TallyError::not_found(context.to_string()))
    }
}
