//! Scanfile error types.

use std::path::PathBuf;

use thiserror::Error;

use dirscan_core::{RecordError, ScanError};

/// Errors from escaping and unescaping text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Unknown escape char '{0}'")]
    UnknownEscape(char),

    #[error("Incomplete escape string '{0}'")]
    Incomplete(String),

    #[error("Invalid escape value '{0}'")]
    InvalidValue(String),
}

/// Errors in a single scanfile record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("Missing or excess file fields (got {0}, want 8)")]
    FieldCount(usize),

    #[error("'type' field (#1) cannot be omitted")]
    MissingType,

    #[error("'path' field (#7) cannot be omitted")]
    MissingPath,

    #[error("Unknown object type '{0}'")]
    UnknownType(String),

    #[error("Scanfile field error: {0}")]
    Field(String),

    #[error("empty filename '{0}'")]
    EmptyFilename(String),

    #[error("invalid filename '{0}'")]
    InvalidFilename(String),

    #[error("'{0}' is an orphan")]
    Orphan(String),

    #[error("'{0}' already exists in file")]
    Duplicate(String),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Errors reading or writing a scanfile.
#[derive(Debug, Error)]
pub enum ScanfileError {
    #[error("Invalid scanfile '{file}', missing header")]
    MissingHeader { file: PathBuf },

    #[error("Invalid scanfile '{file}', malformed header")]
    MalformedHeader { file: PathBuf },

    #[error("Invalid scanfile '{file}', unsupported version '{version}'")]
    UnsupportedVersion { file: PathBuf, version: String },

    #[error("{file}:{line}: Data error, {source}")]
    Data {
        file: PathBuf,
        line: usize,
        #[source]
        source: DataError,
    },

    #[error("Scanfile '{file}' contains no data or no top-level directory")]
    NoData { file: PathBuf },

    #[error("No such directory '{root}' found in scanfile '{file}'")]
    NoSuchRoot { file: PathBuf, root: String },

    #[error("I/O error on scanfile '{file}': {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl ScanfileError {
    pub(crate) fn io(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            file: file.into(),
            source,
        }
    }
}
