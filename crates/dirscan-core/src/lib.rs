//! Core types for dirscan.
//!
//! This crate provides the entry model shared by the walker, the scanfile
//! codec and the comparator: file system entries with lazily listed children
//! and lazily computed content hashes, plus walk configuration and errors.

mod config;
mod entry;
mod error;

pub use config::{WalkConfig, WalkConfigBuilder};
pub use entry::{
    Children, ContentHash, DifferenceTag, Entry, EntryRef, EntryType, HashState, Metadata,
    RecordFields, HASH_CHUNK_SIZE, S_IFMT, TIME_THRESHOLD,
};
pub use error::{RecordError, ScanError};
