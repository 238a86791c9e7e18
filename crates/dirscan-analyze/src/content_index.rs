//! Content addressed index of files across one or more trees.
//!
//! The index maps a content hash to every file carrying it, together with
//! the position of the tree the file came from. The comparator uses it to
//! flag duplicates within a tree and renames between trees.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use dirscan_core::{ContentHash, EntryRef, ScanError, WalkConfig};
use dirscan_scan::{ProgressReporter, TandemWalk};

/// A file recorded in the index.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    /// Position of the tree the file belongs to.
    pub tree: usize,
    pub entry: EntryRef,
}

/// Map from content hash to the files sharing it.
#[derive(Debug, Default)]
pub struct ContentIndex {
    buckets: HashMap<ContentHash, Vec<IndexedFile>>,
    files: usize,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every non-excluded file below `roots`.
    ///
    /// Each root is walked on its own with its children retained, so the
    /// same trees can be walked again for comparison afterwards. Hashing
    /// and listing failures go to `on_error`; returning `true` skips the
    /// entry, `false` aborts with the error.
    pub fn build<'a>(
        roots: &[EntryRef],
        config: &WalkConfig,
        on_error: impl FnMut(&ScanError) -> bool,
        progress: Option<ProgressReporter<'a>>,
    ) -> Result<Self, ScanError> {
        let config = WalkConfig {
            sequential: true,
            close_during: false,
            ..config.clone()
        };
        let on_error = RefCell::new(on_error);
        let errors = Cell::new(0usize);
        let skip = |err: &ScanError| {
            errors.set(errors.get() + 1);
            (on_error.borrow_mut())(err)
        };

        let mut walk = TandemWalk::new(roots.to_vec(), &config)?.with_error_handler(skip);
        if let Some(progress) = progress {
            walk = walk.with_progress(progress);
        }

        let mut index = Self::new();
        // Sequential walks start every tree at "."
        let mut tree = None;
        for item in walk {
            let (relpath, entries) = item?;
            if relpath == Path::new(".") {
                tree = Some(tree.map_or(0, |t| t + 1));
            }
            let Some(tree) = tree else { continue };
            for entry in entries {
                if !entry.is_file() || entry.is_excluded() {
                    continue;
                }
                if let Err(err) = index.insert(tree, entry) {
                    if !skip(&err) {
                        return Err(err);
                    }
                    warn!(error = %err, "Leaving file out of content index");
                }
            }
        }

        debug!(
            files = index.files,
            hashes = index.buckets.len(),
            errors = errors.get(),
            "Built content index"
        );
        Ok(index)
    }

    /// Add a single file. Files without a known hash are left out and
    /// `false` is returned.
    pub fn insert(&mut self, tree: usize, entry: EntryRef) -> Result<bool, ScanError> {
        let Some(hash) = entry.content_hash()? else {
            return Ok(false);
        };
        entry.set_tree_index(tree);
        self.buckets
            .entry(hash)
            .or_default()
            .push(IndexedFile { tree, entry });
        self.files += 1;
        Ok(true)
    }

    /// All files with the given hash.
    pub fn bucket(&self, hash: &ContentHash) -> &[IndexedFile] {
        self.buckets.get(hash).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether more than one file carries `hash`.
    pub fn is_duplicated(&self, hash: &ContentHash) -> bool {
        self.bucket(hash).len() > 1
    }

    /// The file from `tree` with the given hash.
    ///
    /// When several files of that tree match, the one with the smallest
    /// full path is returned.
    pub fn find_in_tree(&self, hash: &ContentHash, tree: usize) -> Option<&IndexedFile> {
        self.bucket(hash)
            .iter()
            .filter(|file| file.tree == tree)
            .min_by_key(|file| file.entry.full_path())
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files == 0
    }

    /// Buckets holding more than one file, ordered by hash.
    pub fn duplicate_groups(&self) -> Vec<(ContentHash, &[IndexedFile])> {
        let mut groups: Vec<_> = self
            .buckets
            .iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(hash, files)| (*hash, files.as_slice()))
            .collect();
        groups.sort_by_key(|(hash, _)| *hash);
        groups
    }
}
