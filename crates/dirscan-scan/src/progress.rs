//! Walk progress reporting.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Progress information during a walk.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of tuples or files visited so far.
    pub count: u64,
    /// Path most recently visited.
    pub current_path: PathBuf,
    /// Time elapsed since the walk started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Visit rate in items per second.
    pub fn items_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.count as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Forwards progress to a sink, at most once per interval.
pub struct ProgressReporter<'a> {
    start: Instant,
    last_report: Option<Instant>,
    interval: Duration,
    count: u64,
    sink: Box<dyn FnMut(&ScanProgress) + 'a>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(interval: Duration, sink: impl FnMut(&ScanProgress) + 'a) -> Self {
        Self {
            start: Instant::now(),
            last_report: None,
            interval,
            count: 0,
            sink: Box::new(sink),
        }
    }

    /// Record one visited item, reporting if the interval has passed.
    pub fn tick(&mut self, path: &Path) {
        self.count += 1;
        let now = Instant::now();
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_report = Some(now);
            self.report(path);
        }
    }

    /// Report the final state unconditionally.
    pub fn finish(&mut self, path: &Path) {
        self.report(path);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn report(&mut self, path: &Path) {
        let progress = ScanProgress {
            count: self.count,
            current_path: path.to_path_buf(),
            elapsed: self.start.elapsed(),
        };
        (self.sink)(&progress);
    }
}

impl std::fmt::Debug for ProgressReporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("interval", &self.interval)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
