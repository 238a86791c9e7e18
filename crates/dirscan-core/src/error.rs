//! Error types for entry construction and traversal.

use std::path::PathBuf;

use thiserror::Error;

use crate::entry::EntryType;

/// Errors raised while reading entries from the file system.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A traversal root is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The file system reported a file type we cannot represent.
    #[error("Unknown file type: {path}")]
    UnknownFileType { path: PathBuf },

    /// The directory's children were released by `close()`.
    #[error("Directory has been closed: {path}")]
    Closed { path: PathBuf },

    /// An exclusion pattern could not be compiled.
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source },
        }
    }

    /// The path the error refers to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::Io { path, .. }
            | Self::NotADirectory { path }
            | Self::UnknownFileType { path }
            | Self::Closed { path } => Some(path),
            Self::InvalidPattern { .. } => None,
        }
    }
}

/// Errors raised when building an entry from decoded record fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The type bits carried in the mode disagree with the declared type.
    #[error("Object type '{}' does not match mode 'o{mode:o}'", .entry_type.code())]
    ModeMismatch { entry_type: EntryType, mode: u32 },

    /// `Missing` cannot be stored in a record.
    #[error("Object type '{}' cannot be stored", .entry_type.code())]
    NotStorable { entry_type: EntryType },

    /// The hash payload is not a valid hex digest.
    #[error("Invalid hash '{0}'")]
    InvalidHash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));
        assert_eq!(err.path(), Some(std::path::Path::new("/test/path")));
    }

    #[test]
    fn test_scan_error_io_other() {
        let err = ScanError::io("/x", std::io::Error::other("boom"));
        assert!(matches!(err, ScanError::Io { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_record_error_message() {
        let err = RecordError::ModeMismatch {
            entry_type: EntryType::File,
            mode: 0o40755,
        };
        assert_eq!(
            err.to_string(),
            "Object type 'f' does not match mode 'o40755'"
        );
    }
}
