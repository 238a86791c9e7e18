//! Running totals for a scan or compare.

use std::collections::BTreeMap;

use serde::Serialize;

use dirscan_core::{Entry, EntryType};

use crate::compare::Classification;

/// Entry counts for one tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub block_devices: u64,
    pub char_devices: u64,
    pub fifos: u64,
    pub sockets: u64,
    pub excluded: u64,
    /// Total size of the counted files.
    pub file_bytes: u64,
}

impl TreeStats {
    /// Devices, fifos and sockets.
    pub fn special(&self) -> u64 {
        self.block_devices + self.char_devices + self.fifos + self.sockets
    }

    /// Every counted entry, excluded ones included.
    pub fn total(&self) -> u64 {
        self.files + self.dirs + self.symlinks + self.special() + self.excluded
    }

    fn add(&mut self, entry: &Entry) {
        if entry.is_excluded() {
            self.excluded += 1;
            return;
        }
        match entry.entry_type() {
            EntryType::File => {
                self.files += 1;
                self.file_bytes += entry.size();
            }
            EntryType::Directory => self.dirs += 1,
            EntryType::Symlink => self.symlinks += 1,
            EntryType::BlockDevice => self.block_devices += 1,
            EntryType::CharDevice => self.char_devices += 1,
            EntryType::Fifo => self.fifos += 1,
            EntryType::Socket => self.sockets += 1,
            EntryType::Missing => {}
        }
    }
}

/// Classification histogram plus per-tree entry counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompareStats {
    classifications: BTreeMap<Classification, u64>,
    trees: Vec<TreeStats>,
    errors: u64,
}

impl CompareStats {
    pub fn new(tree_count: usize) -> Self {
        Self {
            classifications: BTreeMap::new(),
            trees: vec![TreeStats::default(); tree_count],
            errors: 0,
        }
    }

    pub fn add_classification(&mut self, classification: Classification) {
        *self.classifications.entry(classification).or_default() += 1;
    }

    /// Count the entries of one walk item, position by position.
    pub fn add_entries<E: AsRef<Entry>>(&mut self, entries: &[E]) {
        if self.trees.len() < entries.len() {
            self.trees.resize(entries.len(), TreeStats::default());
        }
        for (stats, entry) in self.trees.iter_mut().zip(entries) {
            stats.add(entry.as_ref());
        }
    }

    /// Count a file or directory that could not be read.
    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Number of items with the given classification.
    pub fn count(&self, classification: Classification) -> u64 {
        self.classifications
            .get(&classification)
            .copied()
            .unwrap_or_default()
    }

    /// Number of classified items.
    pub fn total(&self) -> u64 {
        self.classifications.values().sum()
    }

    pub fn tree(&self, index: usize) -> Option<&TreeStats> {
        self.trees.get(index)
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }
}
