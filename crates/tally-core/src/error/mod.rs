//! Error types for the context engine
//!
//! Every fallible operation in the crate returns [`TallyResult`]. Variants carry a
//! human-readable message plus optional context describing where the failure happened.
//! The first five variants form the engine's own taxonomy; the rest cover the plumbing
//! around it (configuration, I/O, the summarization provider).

mod constructors;
mod context;
mod conversions;
mod types;

#[cfg(test)]
mod tests;

pub use context::{OptionExt, ResultExt};
pub use types::{TallyError, TallyResult};
