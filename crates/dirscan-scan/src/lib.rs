//! Tandem directory walker for dirscan.
//!
//! # Overview
//!
//! `dirscan-scan` walks one or more directory trees in lock-step and yields,
//! for every relative path seen in any tree, the entries found at that path
//! in each tree. Trees lacking a path get a `Missing` placeholder, so the
//! Nth entry of every item always belongs to the Nth root.
//!
//! # Example
//!
//! ```rust,no_run
//! use dirscan_scan::{TandemWalk, WalkConfig};
//!
//! let walk = TandemWalk::from_paths(&["left", "right"], &WalkConfig::new()).unwrap();
//! for item in walk {
//!     let (path, entries) = item.unwrap();
//!     println!("{}: {} entries", path.display(), entries.len());
//! }
//! ```

mod exclude;
mod progress;
mod walker;

pub use exclude::{normalize_pattern, ExcludeMatcher};
pub use progress::{ProgressReporter, ScanProgress};
pub use walker::{walk_all, TandemWalk, WalkItem};

// Re-export core types for convenience
pub use dirscan_core::{Entry, EntryRef, EntryType, ScanError, WalkConfig, WalkConfigBuilder};
