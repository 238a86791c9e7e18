//! Tandem walk over one or more directory trees.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use itertools::Itertools;
use tracing::{debug, trace, warn};

use dirscan_core::{Children, Entry, EntryRef, ScanError, WalkConfig};

use crate::exclude::ExcludeMatcher;
use crate::progress::ProgressReporter;

/// One step of a walk: the relative path and one entry per tree.
pub type WalkItem = (PathBuf, Vec<EntryRef>);

type ErrorHandler<'a> = Box<dyn FnMut(&ScanError) -> bool + 'a>;

/// Depth-first walk over N trees in lock-step.
///
/// Each item holds the entries found at the same relative path in every
/// tree, with [`Entry::missing`] placeholders where a tree lacks the path.
/// Siblings are visited in ascending name order, or descending when
/// `reverse` is set. The walk keeps an explicit stack of pending items and
/// expands an item only after it has been handed to the caller.
///
/// Per-entry errors go through the error handler. When there is none, or it
/// returns `false`, the error is yielded and the walk ends.
pub struct TandemWalk<'a> {
    config: WalkConfig,
    matcher: ExcludeMatcher,
    one_sided: bool,
    bases: Vec<EntryRef>,
    stack: Vec<WalkItem>,
    pending_roots: VecDeque<EntryRef>,
    last: Option<WalkItem>,
    error_handler: Option<ErrorHandler<'a>>,
    progress: Option<ProgressReporter<'a>>,
    finished: bool,
}

impl<'a> TandemWalk<'a> {
    /// Prepare a walk over `roots`.
    ///
    /// Every root must be a directory whose children can be listed; failures
    /// here are returned directly and never reach the error handler.
    pub fn new(roots: Vec<EntryRef>, config: &WalkConfig) -> Result<Self, ScanError> {
        let matcher = ExcludeMatcher::new(config.excludes.as_slice())?;
        for root in &roots {
            if !root.is_dir() {
                return Err(ScanError::NotADirectory {
                    path: root.full_path(),
                });
            }
            root.children()?;
        }

        debug!(
            roots = roots.len(),
            sequential = config.sequential,
            "Starting walk"
        );

        let mut walk = Self {
            config: config.clone(),
            matcher,
            one_sided: config.one_sided_for(roots.len()),
            bases: Vec::new(),
            stack: Vec::new(),
            pending_roots: VecDeque::new(),
            last: None,
            error_handler: None,
            progress: None,
            finished: false,
        };

        if config.sequential {
            walk.one_sided = true;
            walk.pending_roots = roots.into();
        } else {
            walk.stack.push((PathBuf::from("."), roots.clone()));
            walk.bases = roots;
        }
        Ok(walk)
    }

    /// Walk the given directory paths.
    pub fn from_paths<P: AsRef<Path>>(
        paths: &[P],
        config: &WalkConfig,
    ) -> Result<Self, ScanError> {
        let roots = paths
            .iter()
            .map(Entry::root)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(roots, config)
    }

    /// Install a handler for recoverable errors. Returning `true` skips the
    /// failing entry and continues the walk.
    pub fn with_error_handler(mut self, handler: impl FnMut(&ScanError) -> bool + 'a) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Report every yielded item to `progress`.
    pub fn with_progress(mut self, progress: ProgressReporter<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn handle_error(&mut self, err: ScanError) -> Result<(), ScanError> {
        if self.error_handler.as_mut().is_some_and(|handler| handler(&err)) {
            warn!(error = %err, "Skipping entry after error");
            Ok(())
        } else {
            Err(err)
        }
    }

    fn mark_excluded(&self, path: &Path, entries: &[EntryRef]) {
        let pattern_hit = self.matcher.is_match(path);
        for (entry, base) in entries.iter().zip(&self.bases) {
            let other_device = self.config.one_filesystem
                && !entry.is_missing()
                && entry.device_id() != base.device_id();
            if pattern_hit || other_device {
                entry.set_excluded();
            }
        }
    }

    /// Queue the children of a yielded item.
    fn expand(&mut self, path: &Path, entries: &[EntryRef]) -> Result<(), ScanError> {
        let present = entries
            .iter()
            .filter(|e| !e.is_missing() && !e.is_excluded())
            .count();

        let mut sides: Vec<Rc<Children>> = Vec::with_capacity(entries.len());
        for entry in entries {
            let descend = entry.is_dir() && !entry.is_excluded() && (self.one_sided || present > 1);
            let children = if descend {
                match entry.children() {
                    Ok(children) => children,
                    Err(err) => {
                        self.handle_error(err)?;
                        Rc::default()
                    }
                }
            } else {
                Rc::default()
            };
            sides.push(children);
        }

        let names: Vec<_> = sides.iter().flat_map(|c| c.keys()).sorted().dedup().collect();
        trace!(path = %path.display(), children = names.len(), "Expanding");

        // Popped from the top, so pushed against visiting order
        let ordered: Box<dyn Iterator<Item = _>> = if self.config.reverse {
            Box::new(names.into_iter())
        } else {
            Box::new(names.into_iter().rev())
        };
        for name in ordered {
            let child_path = if path == Path::new(".") {
                PathBuf::from(name)
            } else {
                path.join(name)
            };
            let tuple = entries
                .iter()
                .zip(&sides)
                .map(|(parent, children)| {
                    children
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| Entry::missing(name.clone(), parent.full_path()))
                })
                .collect();
            self.stack.push((child_path, tuple));
        }

        if self.config.close_during {
            for entry in entries {
                entry.close();
            }
        }
        Ok(())
    }
}

impl Iterator for TandemWalk<'_> {
    type Item = Result<WalkItem, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Some((path, entries)) = self.last.take() {
            if let Err(err) = self.expand(&path, &entries) {
                self.finished = true;
                return Some(Err(err));
            }
        }

        loop {
            if let Some((path, entries)) = self.stack.pop() {
                self.mark_excluded(&path, &entries);
                trace!(path = %path.display(), entries = ?entries, "Visiting");
                if let Some(progress) = self.progress.as_mut() {
                    progress.tick(&path);
                }
                self.last = Some((path.clone(), entries.clone()));
                return Some(Ok((path, entries)));
            }

            let Some(root) = self.pending_roots.pop_front() else {
                self.finished = true;
                return None;
            };
            debug!(root = %root.full_path().display(), "Walking next root");
            self.bases = vec![Rc::clone(&root)];
            self.stack.push((PathBuf::from("."), vec![root]));
        }
    }
}

/// Walk `roots` and collect every item, stopping at the first error.
pub fn walk_all(roots: Vec<EntryRef>, config: &WalkConfig) -> Result<Vec<WalkItem>, ScanError> {
    TandemWalk::new(roots, config)?.collect()
}
