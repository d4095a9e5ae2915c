//! Error types for bootstrap configuration

use thiserror::Error;

/// Fatal configuration errors detected while parsing process arguments.
///
/// None of these are recoverable: the agent is supervised externally and
/// restarts with corrected arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The resource listing had an odd number of comma-separated tokens.
    #[error("resource `{name}` has no matching quantity")]
    UnpairedResource { name: String },

    /// A quantity token did not parse as a floating-point number.
    #[error("resource `{name}` has a non-numeric quantity `{value}`")]
    InvalidQuantity { name: String, value: String },
}
