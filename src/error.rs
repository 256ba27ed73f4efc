// 🚫 Error taxonomy for the categorization engine
// Every failure here is fatal for the call that raised it. Non-fatal
// conditions go through `diagnostics` instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CategorizeError {
    /// Malformed registry or run inputs (identifier columns, patterns, config fields)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unknown scale: {0}")]
    UnknownScale(String),

    #[error("Variable {variable} does not exist in scale {scale}")]
    UnknownVariable { scale: String, variable: String },

    /// Requested variable resolves in none of the requested scales
    #[error("Variable {0} does not exist in any of the requested scales")]
    VariableNotFound(String),

    #[error("Variable {0} is in the excluded variables")]
    ExcludedVariable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Variables missing from the translation dictionary: {}", .0.join(", "))]
    MissingDictionaryEntry(Vec<String>),

    #[error("Non-numeric value {value:?} in {scale}.{variable} (row {row})")]
    NonNumericValue {
        scale: String,
        variable: String,
        row: usize,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, CategorizeError>;

impl CategorizeError {
    pub(crate) fn invalid_q(q: usize) -> Self {
        CategorizeError::InvalidArgument(format!("q must be at least 1, got {}", q))
    }
}
