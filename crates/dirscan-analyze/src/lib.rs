//! Comparison and content analysis for dirscan.
//!
//! This crate classifies the entries yielded by a tandem walk:
//!
//! - **Comparator**: turns one or two entries into a [`Classification`] with
//!   a description
//! - **Content index**: maps content hashes to files, for duplicate and
//!   rename detection
//! - **Statistics**: running totals for summaries

mod compare;
mod content_index;
mod error;
mod stats;

pub use compare::{
    all_compare_types, compare_entries, compare_pair, compare_single, parse_compare_types,
    Classification, CompareConfig, CompareConfigBuilder, Comparison, Ignores,
    COMPARE_TYPES_DEFAULT_COMPARE, COMPARE_TYPES_DEFAULT_SCAN,
};
pub use content_index::{ContentIndex, IndexedFile};
pub use error::AnalyzeError;
pub use stats::{CompareStats, TreeStats};
