//! Scanfile snapshots for dirscan.
//!
//! A scanfile stores a directory tree as text: a `#!ds:v1` header line
//! followed by one record per entry, parents before children. A loaded
//! scanfile is a regular [`dirscan_core::Entry`] tree that never touches the
//! file system, so it can be walked and compared like a live directory.

mod error;
mod quote;
mod reader;
mod record;
mod writer;

pub use error::{DataError, QuoteError, ScanfileError};
pub use quote::{bytes_to_os, os_to_bytes, quote, unquote};
pub use reader::{is_scanfile, parse_scanfile, read_scanfile};
pub use record::{format_record, scanfile_relpath, Record};
pub use writer::ScanfileWriter;

/// Header line written at the top of every scanfile.
pub const HEADER: &str = "#!ds:v1\n";

/// Header prefix preceding the version tag.
pub const HEADER_PREFIX: &str = "#!ds:v";

/// Versions this crate can read.
pub const SCANFILE_VERSIONS: &[&str] = &["v1"];
