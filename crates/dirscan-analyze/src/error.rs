//! Error types for option parsing.

use thiserror::Error;

/// Errors from parsing comparison options.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyzeError {
    #[error("Unknown ignore '{0}', valid values are 'u', 'g', 'p' and 't'")]
    UnknownIgnore(char),

    #[error("Unknown filter: '{found}', valid values in '{valid}' or 'all'")]
    UnknownCompareType { found: String, valid: String },
}
