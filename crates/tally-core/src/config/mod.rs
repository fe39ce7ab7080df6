//! Engine configuration
//!
//! Configuration is injected as a typed [`TallyConfig`]. Files are optional: a
//! missing file yields the defaults.

mod file_loader;
mod model;
mod validation;

#[cfg(test)]
mod tests;

pub use file_loader::{ConfigFormat, load_from_file, load_from_str};
pub use model::TallyConfig;
pub use validation::ConfigValidator;
